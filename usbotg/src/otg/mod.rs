//! The dual-role controller of a single port.
//!
//! Producers (interrupt handlers, external charger notifications, administrative requests) only
//! set event bits and wake the worker. The worker, handed out by [`Controller::worker`], is the
//! only writer of the state.
pub mod events;
pub mod platform;
pub mod role;
pub mod state_machine;

use core::cell::RefCell;

use embassy_sync::blocking_mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use events::{OtgEvents, UserEvents};
use heapless::Deque;
use platform::{Notification, Platform};
use role::{HostDriver, PeripheralDriver, Role, RoleController, RoleError};
use state_machine::{Drain, State, Transition, Wake, Worker};

use crate::charger::Capability;
use crate::config::Config;
use crate::timers::Timer;
use crate::units::ElectricCurrent;

/// Number of transitions that are kept for diagnostics.
pub const TRANSITION_HISTORY: usize = 16;

/// Errors that can occur in the controller.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Operating a role failed.
    #[error("role failure")]
    Role(#[from] RoleError),
    /// A worker is already attached to the controller.
    #[error("worker exists")]
    WorkerExists,
    /// A driver for the role is already registered.
    #[error("driver for role {0:?} already registered")]
    AlreadyRegistered(Role),
}

/// Power draw changes, as reported by the peripheral link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VbusDraw {
    /// The host suspended the link.
    Suspend,
    /// The host resumed the link.
    Resume,
    /// The host configured the peripheral for drawing this current.
    Configured(ElectricCurrent),
}

#[cfg(feature = "defmt")]
impl defmt::Format for VbusDraw {
    fn format(&self, f: defmt::Formatter) {
        use uom::si::electric_current::milliampere;

        match self {
            VbusDraw::Suspend => defmt::write!(f, "Suspend"),
            VbusDraw::Resume => defmt::write!(f, "Resume"),
            VbusDraw::Configured(current) => defmt::write!(f, "Configured({} mA)", current.get::<milliampere>()),
        }
    }
}

/// State that is shared between producers and the worker.
#[derive(Debug)]
struct Shared {
    otg_events: OtgEvents,
    user_events: UserEvents,
    capability: Capability,
    configured_current: Option<ElectricCurrent>,
    pending_draw: Option<VbusDraw>,
    state: State,
    prev_state: State,
    transitions: Deque<Transition, TRANSITION_HISTORY>,
    terminate: bool,
    shutdown: bool,
    running: bool,
    worker_alive: bool,
}

impl Shared {
    fn new() -> Self {
        Self {
            otg_events: OtgEvents::NONE,
            user_events: UserEvents::NONE,
            capability: Capability::none(),
            configured_current: None,
            pending_draw: None,
            state: State::BIdle,
            prev_state: State::BIdle,
            transitions: Deque::new(),
            terminate: false,
            shutdown: false,
            running: false,
            worker_alive: false,
        }
    }
}

/// The dual-role controller of a single port.
///
/// `M` selects the raw mutex, for example a critical section mutex on target.
pub struct Controller<M: RawMutex, P: Platform, H: HostDriver, D: PeripheralDriver> {
    config: Config,
    shared: blocking_mutex::Mutex<M, RefCell<Shared>>,
    wakeup: Signal<M, ()>,
    roles: Mutex<M, RoleController<P, H, D>>,
}

impl<M: RawMutex, P: Platform, H: HostDriver, D: PeripheralDriver> Controller<M, P, H, D> {
    /// Create a new controller on top of a `platform`, without registered drivers.
    pub fn new(config: Config, platform: P) -> Self {
        Self {
            config,
            shared: blocking_mutex::Mutex::new(RefCell::new(Shared::new())),
            wakeup: Signal::new(),
            roles: Mutex::new(RoleController::new(platform)),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn with_shared<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        self.shared.lock(|shared| f(&mut shared.borrow_mut()))
    }

    /// Post hardware events, and wake the worker.
    pub fn post_otg_events(&self, events: OtgEvents) {
        trace!("Post OTG events {:?}", events);
        self.with_shared(|shared| shared.otg_events |= events);
        self.wakeup.signal(());
    }

    /// Post administrative events, and wake the worker.
    pub fn post_user_events(&self, events: UserEvents) {
        trace!("Post user events {:?}", events);
        self.with_shared(|shared| shared.user_events |= events);
        self.wakeup.signal(());
    }

    /// Bridge an external notification into the event bitmask.
    pub fn notify(&self, notification: Notification) {
        self.post_otg_events(P::translate_notification(notification));
    }

    /// Force the A-role (host).
    pub fn force_role_a(&self) {
        self.post_user_events(UserEvents::FORCE_A);
    }

    /// Force the B-role (peripheral).
    pub fn force_role_b(&self) {
        self.post_user_events(UserEvents::FORCE_B);
    }

    /// Drop the bus.
    pub fn bus_drop(&self) {
        self.post_user_events(UserEvents::BUS_DROP);
    }

    /// Pretend that VBUS rose (`true`), or fell.
    pub fn force_vbus(&self, high: bool) {
        self.post_otg_events(if high {
            OtgEvents::VBUS_VALID
        } else {
            OtgEvents::VBUS_END
        });
    }

    /// Report a power draw change of the peripheral link.
    ///
    /// Only the latest change is kept, until the worker picks it up.
    pub fn set_vbus_draw(&self, draw: VbusDraw) {
        self.with_shared(|shared| {
            shared.pending_draw = Some(draw);
            shared.otg_events |= OtgEvents::PERIPHERAL_DRAW;
        });
        self.wakeup.signal(());
    }

    /// Register the host driver.
    pub async fn register_host(&self, host: H) -> Result<(), Error> {
        let mut roles = self.roles.lock().await;
        if roles.has_host() {
            return Err(Error::AlreadyRegistered(Role::Host));
        }

        info!("Register host driver");
        roles.attach_host(host);
        self.wakeup.signal(());
        Ok(())
    }

    /// Register the peripheral driver.
    pub async fn register_peripheral(&self, peripheral: D) -> Result<(), Error> {
        let mut roles = self.roles.lock().await;
        if roles.has_peripheral() {
            return Err(Error::AlreadyRegistered(Role::Peripheral));
        }

        info!("Register peripheral driver");
        roles.attach_peripheral(peripheral);
        self.wakeup.signal(());
        Ok(())
    }

    /// Deregister the host driver, stopping it first if it is active.
    ///
    /// A running worker is terminated.
    pub async fn deregister_host(&self) -> Option<H> {
        let mut roles = self.roles.lock().await;
        if let Err(error) = roles.stop_host().await {
            warn!("Stopping host on deregistration failed: {:?}", error);
        }

        let host = roles.detach_host();
        info!("Deregister host driver");
        self.request_termination();

        host
    }

    /// Deregister the peripheral driver, stopping it first if it is active.
    ///
    /// A running worker is terminated.
    pub async fn deregister_peripheral(&self) -> Option<D> {
        let mut roles = self.roles.lock().await;
        if let Err(error) = roles.stop_peripheral().await {
            warn!("Stopping peripheral on deregistration failed: {:?}", error);
        }

        let peripheral = roles.detach_peripheral();
        info!("Deregister peripheral driver");
        self.request_termination();

        peripheral
    }

    fn request_termination(&self) {
        self.with_shared(|shared| {
            if shared.running {
                shared.terminate = true;
            }
        });
        self.wakeup.signal(());
    }

    /// Terminate the worker, and make [`Worker::run`] return.
    pub fn shutdown(&self) {
        info!("Shutdown");
        self.with_shared(|shared| {
            shared.shutdown = true;
            shared.terminate = true;
        });
        self.wakeup.signal(());
    }

    /// Suspend the host's bus, while the host role is active.
    pub async fn suspend_host(&self) -> Result<(), Error> {
        Ok(self.roles.lock().await.suspend_host().await?)
    }

    /// Resume the host's bus, while the host role is active.
    pub async fn resume_host(&self) -> Result<(), Error> {
        Ok(self.roles.lock().await.resume_host().await?)
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.with_shared(|shared| shared.state)
    }

    /// The previous state.
    pub fn prev_state(&self) -> State {
        self.with_shared(|shared| shared.prev_state)
    }

    /// The current charging capability.
    pub fn capability(&self) -> Capability {
        self.with_shared(|shared| shared.capability)
    }

    /// Whether the worker currently runs the state machine.
    pub fn is_running(&self) -> bool {
        self.with_shared(|shared| shared.running)
    }

    /// The most recent transitions, oldest first.
    pub fn transitions(&self) -> heapless::Vec<Transition, TRANSITION_HISTORY> {
        self.with_shared(|shared| shared.transitions.iter().copied().collect())
    }

    /// Hand out the worker, which runs the state machine.
    ///
    /// There is at most one worker at a time.
    pub fn worker<TIMER: Timer>(&self) -> Result<Worker<'_, M, P, H, D, TIMER>, Error> {
        let exists = self.with_shared(|shared| core::mem::replace(&mut shared.worker_alive, true));

        if exists {
            Err(Error::WorkerExists)
        } else {
            Ok(Worker::new(self))
        }
    }

    /// Drain the pending events, once any of them matches the masks.
    ///
    /// A termination request takes precedence over all events. Only the matching events are
    /// reported. With [`Drain::All`], the others are discarded.
    fn take_events(&self, otg_mask: OtgEvents, user_mask: UserEvents, drain: Drain) -> Option<Wake> {
        self.with_shared(|shared| {
            if shared.terminate {
                return Some(Wake::Terminate);
            }

            let otg = shared.otg_events & otg_mask;
            let user = shared.user_events & user_mask;

            if otg.is_empty() && user.is_empty() {
                return None;
            }

            match drain {
                Drain::Awaited => {
                    shared.otg_events.remove(otg);
                    shared.user_events.remove(user);
                }
                Drain::All => {
                    trace!("Drain all events {:?} {:?}", shared.otg_events, shared.user_events);
                    shared.otg_events = OtgEvents::NONE;
                    shared.user_events = UserEvents::NONE;
                }
            }

            Some(Wake::Events { otg, user })
        })
    }
}
