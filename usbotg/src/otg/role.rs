//! Starts and stops the host and peripheral role drivers, switches VBUS and publishes charging capabilities.
//!
//! At most one role is active at a time. A role is marked active as soon as its start is issued,
//! so that the stop which follows a failed start still reaches the driver and the post-stop hook.
use core::future::Future;

use super::platform::{Platform, VbusError};
use crate::charger::Capability;

/// Errors that role drivers report.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// The controller failed to start.
    #[error("start failed")]
    StartFailed,
    /// The controller failed to stop.
    #[error("stop failed")]
    StopFailed,
    /// The controller is busy with another request.
    #[error("controller busy")]
    Busy,
}

/// The host controller driver.
pub trait HostDriver {
    /// Start host operation.
    fn start(&mut self) -> impl Future<Output = Result<(), DriverError>>;

    /// Stop host operation.
    fn stop(&mut self) -> impl Future<Output = Result<(), DriverError>>;

    /// Suspend the bus.
    fn suspend(&mut self) -> impl Future<Output = Result<(), DriverError>> {
        async { Ok(()) }
    }

    /// Resume the bus.
    fn resume(&mut self) -> impl Future<Output = Result<(), DriverError>> {
        async { Ok(()) }
    }
}

/// The peripheral (device) controller driver.
pub trait PeripheralDriver {
    /// Start peripheral operation.
    fn start(&mut self) -> impl Future<Output = Result<(), DriverError>>;

    /// Stop peripheral operation.
    fn stop(&mut self) -> impl Future<Output = Result<(), DriverError>>;
}

/// The role of the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Role {
    /// A-role, the port is host.
    Host,
    /// B-role, the port is peripheral.
    Peripheral,
}

/// Errors that can occur when operating roles.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RoleError {
    /// No host driver is registered.
    #[error("no host driver registered")]
    NoHostDriver,
    /// No peripheral driver is registered.
    #[error("no peripheral driver registered")]
    NoPeripheralDriver,
    /// The other role is still active.
    #[error("role {0:?} is active")]
    RoleActive(Role),
    /// The role is not active.
    #[error("role {0:?} is not active")]
    RoleInactive(Role),
    /// A role driver failed.
    #[error("driver failure")]
    Driver(#[from] DriverError),
    /// Switching VBUS failed.
    #[error("VBUS failure")]
    Vbus(#[from] VbusError),
}

/// Operates the role drivers on top of a platform.
#[derive(Debug)]
pub struct RoleController<P: Platform, H: HostDriver, D: PeripheralDriver> {
    platform: P,
    host: Option<H>,
    peripheral: Option<D>,
    active: Option<Role>,
    vbus_driven: bool,
}

impl<P: Platform, H: HostDriver, D: PeripheralDriver> RoleController<P, H, D> {
    /// Create a new role controller without registered drivers.
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            host: None,
            peripheral: None,
            active: None,
            vbus_driven: false,
        }
    }

    /// The platform.
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Whether a host driver is registered.
    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    /// Whether a peripheral driver is registered.
    pub fn has_peripheral(&self) -> bool {
        self.peripheral.is_some()
    }

    /// Register a host driver, replacing any previous one.
    pub(crate) fn attach_host(&mut self, host: H) {
        self.host = Some(host);
    }

    /// Register a peripheral driver, replacing any previous one.
    pub(crate) fn attach_peripheral(&mut self, peripheral: D) {
        self.peripheral = Some(peripheral);
    }

    /// Remove the host driver. The role must have been stopped.
    pub(crate) fn detach_host(&mut self) -> Option<H> {
        self.host.take()
    }

    /// Remove the peripheral driver. The role must have been stopped.
    pub(crate) fn detach_peripheral(&mut self) -> Option<D> {
        self.peripheral.take()
    }

    /// The currently active role.
    pub fn active(&self) -> Option<Role> {
        self.active
    }

    /// Whether this port drives VBUS.
    pub fn vbus_driven(&self) -> bool {
        self.vbus_driven
    }

    fn ensure_startable(&self, role: Role) -> Result<(), RoleError> {
        let registered = match role {
            Role::Host => self.has_host(),
            Role::Peripheral => self.has_peripheral(),
        };

        if !registered {
            return Err(match role {
                Role::Host => RoleError::NoHostDriver,
                Role::Peripheral => RoleError::NoPeripheralDriver,
            });
        }

        match self.active {
            Some(active) if active != role => Err(RoleError::RoleActive(active)),
            _ => Ok(()),
        }
    }

    /// Check that the host role could be started, without side effects.
    pub fn check_host(&self) -> Result<(), RoleError> {
        self.ensure_startable(Role::Host)
    }

    /// Check that the peripheral role could be started, without side effects.
    pub fn check_peripheral(&self) -> Result<(), RoleError> {
        self.ensure_startable(Role::Peripheral)
    }

    /// Start the host role.
    pub async fn start_host(&mut self) -> Result<(), RoleError> {
        self.ensure_startable(Role::Host)?;
        if self.active == Some(Role::Host) {
            return Ok(());
        }

        self.platform.prepare_start_host().await;
        self.active = Some(Role::Host);

        info!("Start host");
        match self.host.as_mut() {
            Some(host) => host.start().await?,
            None => return Err(RoleError::NoHostDriver),
        }

        Ok(())
    }

    /// Stop the host role. Succeeds without action, if the role is not active.
    pub async fn stop_host(&mut self) -> Result<(), RoleError> {
        if self.active != Some(Role::Host) {
            return Ok(());
        }

        info!("Stop host");
        let result = match self.host.as_mut() {
            Some(host) => host.stop().await,
            None => Ok(()),
        };

        self.active = None;
        self.platform.after_stop_host().await;

        Ok(result?)
    }

    /// Start the peripheral role.
    pub async fn start_peripheral(&mut self) -> Result<(), RoleError> {
        self.ensure_startable(Role::Peripheral)?;
        if self.active == Some(Role::Peripheral) {
            return Ok(());
        }

        self.platform.prepare_start_peripheral().await;
        self.active = Some(Role::Peripheral);

        info!("Start peripheral");
        match self.peripheral.as_mut() {
            Some(peripheral) => peripheral.start().await?,
            None => return Err(RoleError::NoPeripheralDriver),
        }

        Ok(())
    }

    /// Stop the peripheral role. Succeeds without action, if the role is not active.
    pub async fn stop_peripheral(&mut self) -> Result<(), RoleError> {
        if self.active != Some(Role::Peripheral) {
            return Ok(());
        }

        info!("Stop peripheral");
        let result = match self.peripheral.as_mut() {
            Some(peripheral) => peripheral.stop().await,
            None => Ok(()),
        };

        self.active = None;
        self.platform.after_stop_peripheral().await;

        Ok(result?)
    }

    /// Stop whichever role is active.
    pub async fn stop_active(&mut self) -> Result<(), RoleError> {
        match self.active {
            Some(Role::Host) => self.stop_host().await,
            Some(Role::Peripheral) => self.stop_peripheral().await,
            None => Ok(()),
        }
    }

    /// Drive VBUS, or release it.
    pub async fn enable_vbus(&mut self, on: bool) -> Result<(), RoleError> {
        if let Err(error) = self.platform.enable_vbus(on).await {
            warn!("Failed to switch VBUS {:?}: {:?}", on, error);
            return Err(error.into());
        }

        self.vbus_driven = on;
        Ok(())
    }

    /// Release VBUS, if this port drives it.
    pub async fn release_vbus(&mut self) -> Result<(), RoleError> {
        if self.vbus_driven {
            self.enable_vbus(false).await
        } else {
            Ok(())
        }
    }

    /// Stop the active role, and release VBUS.
    ///
    /// Both are attempted, the first error is returned.
    pub async fn stop_all(&mut self) -> Result<(), RoleError> {
        let stopped = self.stop_active().await;
        let released = self.release_vbus().await;

        stopped.and(released)
    }

    /// Suspend the host's bus.
    pub async fn suspend_host(&mut self) -> Result<(), RoleError> {
        if self.active != Some(Role::Host) {
            return Err(RoleError::RoleInactive(Role::Host));
        }

        match self.host.as_mut() {
            Some(host) => Ok(host.suspend().await?),
            None => Err(RoleError::NoHostDriver),
        }
    }

    /// Resume the host's bus.
    pub async fn resume_host(&mut self) -> Result<(), RoleError> {
        if self.active != Some(Role::Host) {
            return Err(RoleError::RoleInactive(Role::Host));
        }

        match self.host.as_mut() {
            Some(host) => Ok(host.resume().await?),
            None => Err(RoleError::NoHostDriver),
        }
    }

    /// Broadcast a charging capability.
    pub async fn publish_capability(&mut self, capability: &Capability) {
        debug!("Publish {:?}", capability);
        self.platform.notify_charger_type(capability).await;
    }
}
