//! The dual-role state machine, driven by a single worker.
//!
//! The worker sleeps until one of the events that its current state waits for is pending, an
//! optional timeout expires, or termination is requested. On wake, it drains exactly the awaited
//! events and runs the transition function of its state.
use core::marker::PhantomData;

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use uom::si::electric_current::milliampere;

use super::events::{OtgEvents, UserEvents};
use super::platform::Platform;
use super::role::{HostDriver, PeripheralDriver, Role, RoleController};
use super::{Controller, Error, VbusDraw};
use crate::ConnectorId;
use crate::charger::{Capability, ChargeEvent, ChargerType, SUSPEND_CURRENT_MA};
use crate::timers::{Timer, TimerType};
use crate::units::ElectricCurrent;


/// States of the dual-role state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum State {
    /// Idle peripheral, nothing attached.
    BIdle,
    /// Classifying the attached charger.
    ChargerDetection,
    /// Bounded wait for VBUS to rise, followed by charger detection.
    ///
    /// No built-in transition enters this state. The host role performs the same bounded wait
    /// inline while it powers the bus, as VBUS driven by this port is not a charger.
    WaitVbusRaise,
    /// Waiting for VBUS to fall, after the host role was left.
    WaitVbusFall,
    /// Charging from a dedicated charger, no role is active.
    Charging,
    /// Host role.
    AHost,
    /// Peripheral role.
    BPeripheral,
    /// Leaving the state machine.
    Exit,
    /// The worker finished.
    Terminated,
}

/// A state transition, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transition {
    /// The state that was left.
    pub from: State,
    /// The state that was entered.
    pub to: State,
}

/// Which pending events a wake consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drain {
    /// Only the awaited events. The others stay pending for the rest of the transition.
    Awaited,
    /// All pending events. Those that were not awaited are discarded.
    All,
}

/// The reason for waking the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    /// Awaited events, which were drained.
    Events { otg: OtgEvents, user: UserEvents },
    /// The timeout expired.
    Timeout,
    /// Termination was requested.
    Terminate,
}

/// The worker, which runs the state machine of a [`Controller`].
pub struct Worker<'a, M: RawMutex, P: Platform, H: HostDriver, D: PeripheralDriver, TIMER: Timer> {
    controller: &'a Controller<M, P, H, D>,
    state: State,
    /// Whether the current state was just entered.
    entry: bool,
    _timer: PhantomData<TIMER>,
}

impl<M: RawMutex, P: Platform, H: HostDriver, D: PeripheralDriver, TIMER: Timer> Drop
    for Worker<'_, M, P, H, D, TIMER>
{
    fn drop(&mut self) {
        self.controller.with_shared(|shared| {
            shared.worker_alive = false;
            shared.running = false;
        });
    }
}

impl<'a, M: RawMutex, P: Platform, H: HostDriver, D: PeripheralDriver, TIMER: Timer> Worker<'a, M, P, H, D, TIMER> {
    pub(super) fn new(controller: &'a Controller<M, P, H, D>) -> Self {
        Self {
            controller,
            state: controller.state(),
            entry: true,
            _timer: PhantomData,
        }
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.state
    }

    fn transition(&mut self, new_state: State) {
        if new_state == self.state {
            return;
        }

        debug!("Transition {:?} -> {:?}", self.state, new_state);

        let transition = Transition {
            from: self.state,
            to: new_state,
        };

        self.controller.with_shared(|shared| {
            shared.prev_state = shared.state;
            shared.state = new_state;

            if shared.transitions.is_full() {
                shared.transitions.pop_front();
            }
            let _ = shared.transitions.push_back(transition);
        });

        self.state = new_state;
        self.entry = true;
    }

    fn set_capability(&self, capability: Capability) {
        self.controller.with_shared(|shared| shared.capability = capability);
    }

    /// Hand an event to the next state.
    fn carry_user_events(&self, events: UserEvents) {
        self.controller.with_shared(|shared| shared.user_events |= events);
    }

    async fn wait_for_events(&self, otg_mask: OtgEvents, user_mask: UserEvents, drain: Drain) -> Wake {
        loop {
            if let Some(wake) = self.controller.take_events(otg_mask, user_mask, drain) {
                return wake;
            }

            self.controller.wakeup.wait().await;
        }
    }

    /// Sleep until an awaited event is pending, the optional timeout expires, or termination is requested.
    ///
    /// A wake by events consumes all pending events.
    async fn sleep_until_event(&self, otg_mask: OtgEvents, user_mask: UserEvents, timeout: Option<TimerType>) -> Wake {
        self.sleep_until(otg_mask, user_mask, timeout, Drain::All).await
    }

    async fn sleep_until(
        &self,
        otg_mask: OtgEvents,
        user_mask: UserEvents,
        timeout: Option<TimerType>,
        drain: Drain,
    ) -> Wake {
        let events = self.wait_for_events(otg_mask, user_mask, drain);

        match timeout {
            None => events.await,
            Some(timer_type) => {
                let timer = timer_type.get_timer::<TIMER>(&self.controller.config.timing);

                match select(events, timer).await {
                    Either::First(wake) => wake,
                    Either::Second(_) => Wake::Timeout,
                }
            }
        }
    }

    /// Run a single step of the state machine, and return the resulting state.
    ///
    /// Failures take the fallback edge (back to idle, or on to termination from exit) before
    /// they are returned. Any active role is stopped and VBUS is released on the way.
    pub async fn run_step(&mut self) -> Result<State, Error> {
        let result = self.update_state().await;

        if let Err(error) = result {
            let fallback = match self.state {
                State::Exit | State::Terminated => State::Terminated,
                _ => State::BIdle,
            };

            error!("{:?} in state {:?}, fall back to {:?}", error, self.state, fallback);

            if let Err(stop_error) = self.controller.roles.lock().await.stop_all().await {
                warn!("Cleanup failed: {:?}", stop_error);
            }

            self.transition(fallback);
            return Err(error);
        }

        Ok(self.state)
    }

    /// Run the state machine continuously.
    ///
    /// Each run starts once the drivers that the port mode requires are registered, and lasts
    /// until termination. Returns after [`Controller::shutdown`].
    pub async fn run(&mut self) {
        loop {
            if !self.wait_for_start().await {
                info!("Worker shut down");
                return;
            }

            self.sample_initial_events().await;

            while self.state != State::Terminated {
                // Errors were logged, and their fallback edges taken.
                let _ = self.run_step().await;
            }

            self.controller.with_shared(|shared| {
                shared.running = false;
                shared.terminate = false;
            });
        }
    }

    /// Returns `false` on shutdown.
    async fn wait_for_start(&mut self) -> bool {
        let controller = self.controller;

        loop {
            if controller.with_shared(|shared| shared.shutdown) {
                return false;
            }

            {
                let mut roles = controller.roles.lock().await;
                if controller
                    .config
                    .mode
                    .is_satisfied(roles.has_host(), roles.has_peripheral())
                {
                    controller.with_shared(|shared| shared.running = true);

                    if self.state != State::BIdle {
                        if let Err(error) = roles.stop_all().await {
                            warn!("Cleanup before start failed: {:?}", error);
                        }
                        self.transition(State::BIdle);
                    }

                    info!("Worker started");
                    return true;
                }
            }

            controller.wakeup.wait().await;
        }
    }

    /// Replace pending hardware events by the current connector ID and VBUS levels.
    async fn sample_initial_events(&mut self) {
        let (id, vbus_valid) = {
            let mut roles = self.controller.roles.lock().await;
            let platform = roles.platform_mut();
            (platform.connector_id().await, platform.vbus_valid().await)
        };

        let mut events = OtgEvents::NONE;
        if id != ConnectorId::Floating {
            events |= OtgEvents::ID_CHANGE;
        }
        if vbus_valid {
            events |= OtgEvents::VBUS_VALID;
        }

        debug!("Initial ID {:?}, VBUS valid {:?}", id, vbus_valid);
        self.controller.with_shared(|shared| shared.otg_events = events);
    }

    async fn update_state(&mut self) -> Result<(), Error> {
        let terminate = self.controller.with_shared(|shared| shared.terminate);
        if terminate && !matches!(self.state, State::Exit | State::Terminated) {
            self.transition(State::Exit);
        }

        let new_state = match self.state {
            State::BIdle => self.b_idle().await,
            State::ChargerDetection => self.charger_detection().await,
            State::WaitVbusRaise => self.wait_vbus_raise().await,
            State::WaitVbusFall => self.wait_vbus_fall().await,
            State::Charging => self.charging().await,
            State::AHost => self.a_host().await?,
            State::BPeripheral => self.b_peripheral().await?,
            State::Exit => {
                self.controller.roles.lock().await.stop_all().await?;
                State::Terminated
            }
            State::Terminated => State::Terminated,
        };

        self.entry = false;
        self.transition(new_state);
        Ok(())
    }

    async fn connector_id(&self) -> ConnectorId {
        self.controller.roles.lock().await.platform_mut().connector_id().await
    }

    async fn b_idle(&mut self) -> State {
        let controller = self.controller;

        if self.entry {
            controller.with_shared(|shared| {
                shared.capability = Capability::none();
                shared.configured_current = None;
                shared.pending_draw = None;
                shared.otg_events.remove(OtgEvents::PERIPHERAL_DRAW);
            });

            let mut roles = controller.roles.lock().await;
            if let Err(error) = roles.release_vbus().await {
                warn!("Failed to release VBUS in idle: {:?}", error);
            }
            roles.platform_mut().idle_housekeeping().await;
        }

        let wake = self
            .sleep_until_event(
                OtgEvents::VBUS_VALID | OtgEvents::VBUS_END | OtgEvents::ID_CHANGE,
                UserEvents::FORCE_A | UserEvents::FORCE_B,
                None,
            )
            .await;

        let (otg, user) = match wake {
            Wake::Terminate => return State::Exit,
            Wake::Timeout => return State::BIdle,
            Wake::Events { otg, user } => (otg, user),
        };

        if user.force_a() {
            return State::AHost;
        }

        if user.force_b() {
            return State::BPeripheral;
        }

        // The order of a rise and a fall that arrived together is unknown, ask the hardware.
        let vbus_valid = if otg.vbus_valid() && otg.vbus_end() {
            controller.roles.lock().await.platform_mut().vbus_valid().await
        } else {
            otg.vbus_valid()
        };

        if vbus_valid {
            return State::ChargerDetection;
        }

        if otg.id_change() {
            return match self.connector_id().await {
                ConnectorId::Floating => State::BIdle,
                ConnectorId::Grounded => State::AHost,
                _ => State::ChargerDetection,
            };
        }

        State::BIdle
    }

    async fn charger_detection(&mut self) -> State {
        let mut roles = self.controller.roles.lock().await;
        let mut charger_type = roles.platform_mut().classify_charger().await;

        if charger_type.is_micro_aca() {
            warn!("Ignore micro ACA {:?}", charger_type);
            charger_type = ChargerType::None;
        }

        if charger_type == ChargerType::None && roles.platform_mut().connector_id().await == ConnectorId::Grounded {
            debug!("Self-powered B-device");
            charger_type = ChargerType::BDevice;
        }

        let capability = match charger_type {
            ChargerType::None => Capability::none(),
            charger_type => Capability::connect(charger_type),
        };
        self.set_capability(capability);

        match charger_type {
            ChargerType::Sdp | ChargerType::Cdp => State::BPeripheral,
            ChargerType::AcaDock => {
                roles.publish_capability(&capability).await;
                State::AHost
            }
            ChargerType::BDevice => State::AHost,
            ChargerType::Dcp | ChargerType::Se1 => {
                roles.publish_capability(&capability).await;
                State::Charging
            }
            _ => State::BIdle,
        }
    }

    async fn wait_vbus_raise(&mut self) -> State {
        match self
            .sleep_until_event(OtgEvents::VBUS_VALID, UserEvents::NONE, Some(TimerType::VbusRise))
            .await
        {
            Wake::Terminate => State::Exit,
            Wake::Events { .. } => State::ChargerDetection,
            Wake::Timeout => {
                warn!("VBUS did not rise, assume host role");
                State::AHost
            }
        }
    }

    async fn wait_vbus_fall(&mut self) -> State {
        match self
            .sleep_until_event(
                OtgEvents::VBUS_END,
                UserEvents::FORCE_A | UserEvents::FORCE_B,
                Some(TimerType::VbusFall),
            )
            .await
        {
            Wake::Terminate => State::Exit,
            Wake::Events { otg, user } if !otg.vbus_end() => {
                debug!("Forced role {:?} ends the wait for VBUS to fall", user);
                self.carry_user_events(user);
                State::BIdle
            }
            Wake::Events { user, .. } => {
                self.carry_user_events(user);

                let capability = self.controller.capability();

                if capability.charger_type == ChargerType::AcaDock && capability.event == ChargeEvent::Connect {
                    let none = Capability::none();
                    self.set_capability(none);
                    self.controller.roles.lock().await.publish_capability(&none).await;
                }

                State::BIdle
            }
            Wake::Timeout => {
                debug!("VBUS fall timeout");
                State::BIdle
            }
        }
    }

    async fn charging(&mut self) -> State {
        self.controller
            .roles
            .lock()
            .await
            .platform_mut()
            .charging_housekeeping()
            .await;

        match self
            .sleep_until_event(OtgEvents::VBUS_END, UserEvents::NONE, None)
            .await
        {
            Wake::Terminate => State::Exit,
            Wake::Timeout => State::Charging,
            Wake::Events { .. } => {
                let none = Capability::none();
                self.set_capability(none);
                self.controller.roles.lock().await.publish_capability(&none).await;

                State::BIdle
            }
        }
    }

    /// Power the bus (unless a dock does) and start the host.
    ///
    /// Returns the next state, if termination interrupted the wait for VBUS.
    async fn enter_a_host(&mut self, dock: bool) -> Result<Option<State>, Error> {
        let controller = self.controller;

        {
            let mut roles = controller.roles.lock().await;
            roles.check_host()?;

            if controller.capability().charger_type == ChargerType::None {
                self.set_capability(Capability::connect(ChargerType::BDevice));
            }

            if !dock {
                roles.enable_vbus(true).await?;
            }
        }

        if !dock {
            // Events other than the rise stay pending for the host role.
            match self
                .sleep_until(
                    OtgEvents::VBUS_VALID,
                    UserEvents::NONE,
                    Some(TimerType::VbusRise),
                    Drain::Awaited,
                )
                .await
            {
                Wake::Terminate => return Ok(Some(State::Exit)),
                Wake::Timeout => warn!("VBUS did not rise, start host anyway"),
                Wake::Events { .. } => (),
            }
        }

        controller.roles.lock().await.start_host().await?;
        Ok(None)
    }

    async fn a_host(&mut self) -> Result<State, Error> {
        let controller = self.controller;
        let dock = controller.capability().charger_type == ChargerType::AcaDock;

        let active = controller.roles.lock().await.active() == Some(Role::Host);
        if !active {
            if let Some(state) = self.enter_a_host(dock).await? {
                return Ok(state);
            }
        }

        let wake = self
            .sleep_until_event(
                OtgEvents::VBUS_END | OtgEvents::ID_CHANGE,
                UserEvents::BUS_DROP | UserEvents::FORCE_B,
                None,
            )
            .await;

        let (otg, user) = match wake {
            Wake::Terminate => return Ok(State::Exit),
            Wake::Timeout => return Ok(State::AHost),
            Wake::Events { otg, user } => (otg, user),
        };

        let mut roles = controller.roles.lock().await;
        // A forced role B that arrived together with a session end outlives it.
        let forced = user & UserEvents::FORCE_B;

        if otg.vbus_end() || (user.bus_drop() && !dock) {
            self.carry_user_events(forced);
            if dock {
                self.publish_disconnect(&mut roles).await;
            } else {
                roles.enable_vbus(false).await?;
            }
            roles.stop_host().await?;

            return Ok(State::BIdle);
        }

        if otg.id_change() {
            let id = roles.platform_mut().connector_id().await;

            if !matches!(id, ConnectorId::Grounded | ConnectorId::A) {
                self.carry_user_events(forced);

                match id {
                    ConnectorId::Floating if dock => {
                        self.publish_disconnect(&mut roles).await;
                        roles.stop_host().await?;
                    }
                    ConnectorId::Floating => {
                        roles.stop_host().await?;
                        roles.enable_vbus(false).await?;
                    }
                    _ => {
                        self.set_capability(Capability::none());
                        roles.stop_host().await?;
                    }
                }

                return Ok(State::WaitVbusFall);
            }
        }

        if user.force_b() {
            self.carry_user_events(forced);
            roles.stop_host().await?;

            return Ok(State::BIdle);
        }

        if user.bus_drop() {
            debug!("Ignore bus drop, the dock supplies VBUS");
        }
        Ok(State::AHost)
    }

    async fn publish_disconnect(&self, roles: &mut RoleController<P, H, D>) {
        let none = Capability::none();
        self.set_capability(none);
        roles.publish_capability(&none).await;
    }

    async fn b_peripheral(&mut self) -> Result<State, Error> {
        let controller = self.controller;

        {
            let mut roles = controller.roles.lock().await;
            if roles.active() != Some(Role::Peripheral) {
                roles.check_peripheral()?;
                roles.start_peripheral().await?;

                let capability = controller.capability();
                if matches!(capability.charger_type, ChargerType::Sdp | ChargerType::Cdp) {
                    roles.publish_capability(&capability).await;
                }
            }
        }

        let wake = self
            .sleep_until_event(
                OtgEvents::VBUS_END | OtgEvents::PERIPHERAL_DRAW,
                UserEvents::FORCE_A,
                None,
            )
            .await;

        let (otg, user) = match wake {
            Wake::Terminate => return Ok(State::Exit),
            Wake::Timeout => return Ok(State::BPeripheral),
            Wake::Events { otg, user } => (otg, user),
        };

        let mut roles = controller.roles.lock().await;

        if otg.vbus_end() || user.force_a() {
            self.carry_user_events(user & UserEvents::FORCE_A);
            roles.stop_peripheral().await?;

            if otg.vbus_end() {
                self.publish_disconnect(&mut roles).await;
            }

            return Ok(State::BIdle);
        }

        self.apply_vbus_draw(&mut roles).await;
        Ok(State::BPeripheral)
    }

    /// Republish the capability for a power draw change of the peripheral link.
    async fn apply_vbus_draw(&self, roles: &mut RoleController<P, H, D>) {
        let (draw, capability, configured) = self.controller.with_shared(|shared| {
            (
                shared.pending_draw.take(),
                shared.capability,
                shared.configured_current,
            )
        });

        let Some(draw) = draw else {
            return;
        };

        let updated = match draw {
            VbusDraw::Suspend => Some(Capability {
                current: ElectricCurrent::new::<milliampere>(SUSPEND_CURRENT_MA),
                event: ChargeEvent::Suspend,
                ..capability
            }),
            VbusDraw::Resume => Some(Capability {
                current: configured.unwrap_or(capability.charger_type.current_limit()),
                event: ChargeEvent::Connect,
                ..capability
            }),
            VbusDraw::Configured(current) if capability.charger_type == ChargerType::Sdp => {
                self.controller
                    .with_shared(|shared| shared.configured_current = Some(current));

                Some(Capability {
                    current,
                    event: ChargeEvent::Connect,
                    ..capability
                })
            }
            VbusDraw::Configured(_) => {
                debug!("Keep the current limit of {:?}", capability.charger_type);
                None
            }
        };

        if let Some(updated) = updated {
            self.set_capability(updated);
            roles.publish_capability(&updated).await;
        }
    }
}
