//! Configuration of the OTG core.
//!
//! All durations that the charger detection and the state machine rely on are calibrated to one
//! PHY family. They are defaults, not protocol constants, and can be tuned per target.

/// Which role drivers a port needs before its state machine is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PortMode {
    /// Host and peripheral drivers are both required.
    #[default]
    DualRole,
    /// Only a host driver is required.
    HostOnly,
    /// Only a peripheral driver is required.
    PeripheralOnly,
}

impl PortMode {
    /// Whether the registered drivers satisfy this mode.
    pub fn is_satisfied(self, has_host: bool, has_peripheral: bool) -> bool {
        match self {
            PortMode::DualRole => has_host && has_peripheral,
            PortMode::HostOnly => has_host,
            PortMode::PeripheralOnly => has_peripheral,
        }
    }
}

/// Durations and budgets for PHY access, charger detection and VBUS supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timing {
    /// Spacing between two polls of the viewport busy status.
    pub viewport_poll_interval_us: u32,
    /// Number of busy polls before a viewport transaction is given up.
    pub viewport_poll_budget: u16,
    /// Settle time between applying the data contact detection pull-up and the first sample.
    pub dcd_settle_us: u32,
    /// Total time to wait for data contact.
    pub dcd_timeout_ms: u32,
    /// Spacing between two data contact samples.
    pub dcd_poll_interval_ms: u32,
    /// Settle time of the data-plus voltage source during primary detection.
    pub primary_detection_ms: u32,
    /// Settle time of the (swapped) data-plus voltage source during secondary detection.
    pub secondary_detection_ms: u32,
    /// Time to wait for VBUS to rise after it was requested.
    pub vbus_rise_timeout_ms: u32,
    /// Time to wait for VBUS to fall after a device was unplugged.
    pub vbus_fall_timeout_ms: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            viewport_poll_interval_us: 5,
            viewport_poll_budget: 200,
            dcd_settle_us: 66_500,
            dcd_timeout_ms: 750,
            dcd_poll_interval_ms: 10,
            primary_detection_ms: 107,
            secondary_detection_ms: 80,
            vbus_rise_timeout_ms: 20_000,
            vbus_fall_timeout_ms: 20_000,
        }
    }
}

impl Timing {
    /// Number of data contact samples that fit into the data contact timeout.
    pub fn dcd_polls(&self) -> u16 {
        let polls = self.dcd_timeout_ms / self.dcd_poll_interval_ms.max(1);
        polls.clamp(1, u16::MAX as u32) as u16
    }
}

/// OTG core configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Role drivers that this port needs.
    pub mode: PortMode,
    /// Timing parameters.
    pub timing: Timing,
}

#[cfg(test)]
mod tests {
    use super::{PortMode, Timing};

    #[test]
    fn test_dcd_polls() {
        let timing = Timing::default();
        assert_eq!(timing.dcd_polls(), 75);

        let timing = Timing {
            dcd_timeout_ms: 5,
            dcd_poll_interval_ms: 10,
            ..Default::default()
        };
        assert_eq!(timing.dcd_polls(), 1);
    }

    #[test]
    fn test_port_mode() {
        assert!(!PortMode::DualRole.is_satisfied(true, false));
        assert!(PortMode::DualRole.is_satisfied(true, true));
        assert!(PortMode::HostOnly.is_satisfied(true, false));
        assert!(!PortMode::PeripheralOnly.is_satisfied(true, false));
    }
}
