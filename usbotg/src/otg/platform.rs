//! The boundary to the silicon vendor's hardware operations, and to the power supply.
use core::future::Future;

use super::events::OtgEvents;
use crate::ConnectorId;
use crate::charger::{Capability, ChargerType};
use crate::phy::PhyError;

/// Errors that can occur, when switching VBUS.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VbusError {
    /// The VBUS switch did not respond.
    #[error("VBUS switch failed")]
    Switch,
    /// The PHY that controls the VBUS switch failed.
    #[error("PHY failure")]
    Phy(#[from] PhyError),
}

/// Notifications from outside the core, for example from an external charger detection IC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Notification {
    /// VBUS was applied.
    VbusOn,
    /// VBUS was removed.
    VbusOff,
    /// The connector ID changed.
    IdChanged,
    /// The external charger detection found a (different) charger.
    ChargerChanged,
}

/// Hardware operations, implemented once per silicon.
///
/// All hooks, except for the ID query, charger classification and capability notification, default to no-ops.
pub trait Platform {
    /// Read the connector ID.
    fn connector_id(&mut self) -> impl Future<Output = ConnectorId>;

    /// Whether VBUS is currently valid.
    ///
    /// Sampled when the state machine starts.
    fn vbus_valid(&mut self) -> impl Future<Output = bool> {
        async { false }
    }

    /// Classify the attached charger.
    fn classify_charger(&mut self) -> impl Future<Output = ChargerType>;

    /// Forward a charging capability to the power supply.
    fn notify_charger_type(&mut self, capability: &Capability) -> impl Future<Output = ()>;

    /// Called on every entry into the idle state.
    fn idle_housekeeping(&mut self) -> impl Future<Output = ()> {
        async {}
    }

    /// Called on every entry into the charging state.
    fn charging_housekeeping(&mut self) -> impl Future<Output = ()> {
        async {}
    }

    /// Called before the host driver is started.
    fn prepare_start_host(&mut self) -> impl Future<Output = ()> {
        async {}
    }

    /// Called before the peripheral driver is started.
    fn prepare_start_peripheral(&mut self) -> impl Future<Output = ()> {
        async {}
    }

    /// Called after the host driver was stopped.
    fn after_stop_host(&mut self) -> impl Future<Output = ()> {
        async {}
    }

    /// Called after the peripheral driver was stopped.
    fn after_stop_peripheral(&mut self) -> impl Future<Output = ()> {
        async {}
    }

    /// Drive VBUS (`on`), or release it.
    ///
    /// Succeeds without action by default, for ports that have VBUS supplied externally.
    fn enable_vbus(&mut self, _on: bool) -> impl Future<Output = Result<(), VbusError>> {
        async { Ok(()) }
    }

    /// Translate an external notification into the events that it stands for.
    fn translate_notification(notification: Notification) -> OtgEvents {
        match notification {
            Notification::VbusOn => OtgEvents::VBUS_VALID,
            Notification::VbusOff => OtgEvents::VBUS_END,
            Notification::IdChanged => OtgEvents::ID_CHANGE,
            // Triggers detection anew.
            Notification::ChargerChanged => OtgEvents::VBUS_VALID,
        }
    }
}

/// The consumer of charging capability broadcasts, e.g. a battery charger driver.
pub trait PowerSupply {
    /// A new charging capability applies.
    fn notify(&mut self, capability: &Capability) -> impl Future<Output = ()>;
}
