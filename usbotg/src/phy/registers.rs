//! PHY register map.
//!
//! Standard ULPI registers, extended by the vendor registers that the charger detection relies on.
//! Registers that support it expose a set alias at `address + 1` and a clear alias at `address + 2`.
use proc_bitfield::bitfield;

use crate::ConnectorId;

/// Register addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// Function control.
    FunctionControl = 0x04,
    /// OTG control.
    OtgControl = 0x0A,
    /// OTG status (interrupt status in ULPI terms).
    OtgStatus = 0x13,
    /// Charger detection line status.
    ChargerStatus = 0x38,
    /// Connector ID resistance status.
    IdStatus = 0x39,
    /// Charger detection power control.
    PowerControl = 0x3D,
}

impl Register {
    /// The address for plain reads and writes.
    pub fn address(self) -> u8 {
        self as u8
    }

    /// The address that sets bits on write, if supported.
    pub fn set_address(self) -> Option<u8> {
        self.has_aliases().then(|| self.address() + 1)
    }

    /// The address that clears bits on write, if supported.
    pub fn clear_address(self) -> Option<u8> {
        self.has_aliases().then(|| self.address() + 2)
    }

    fn has_aliases(self) -> bool {
        matches!(
            self,
            Register::FunctionControl | Register::OtgControl | Register::PowerControl
        )
    }
}

/// Transceiver operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatingMode {
    /// Normal operation.
    Normal,
    /// Non-driving, the data lines are left to the charger detection.
    NonDriving,
    /// Disable bit-stuffing and NRZI encoding.
    DisableBitStuffing,
    /// Reserved.
    Reserved,
}

impl From<u8> for OperatingMode {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0b00 => OperatingMode::Normal,
            0b01 => OperatingMode::NonDriving,
            0b10 => OperatingMode::DisableBitStuffing,
            _ => OperatingMode::Reserved,
        }
    }
}

impl From<OperatingMode> for u8 {
    fn from(value: OperatingMode) -> Self {
        match value {
            OperatingMode::Normal => 0b00,
            OperatingMode::NonDriving => 0b01,
            OperatingMode::DisableBitStuffing => 0b10,
            OperatingMode::Reserved => 0b11,
        }
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct FunctionControl(pub u8): Debug, FromStorage, IntoStorage {
        pub xcvr_select: u8 @ 0..=1,
        pub term_select: bool @ 2,
        pub operating_mode: u8 [get OperatingMode, set OperatingMode] @ 3..=4,
        pub reset: bool @ 5,
        pub suspend_m: bool @ 6,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct OtgControl(pub u8): Debug, FromStorage, IntoStorage {
        pub id_pullup: bool @ 0,
        pub dp_pulldown: bool @ 1,
        pub dm_pulldown: bool @ 2,
        pub discharge_vbus: bool @ 3,
        pub charge_vbus: bool @ 4,
        /// Drive VBUS from the internal supply.
        pub drive_vbus: bool @ 5,
        /// Drive VBUS from an external supply.
        pub drive_vbus_external: bool @ 6,
        pub use_external_vbus_indicator: bool @ 7,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct OtgStatus(pub u8): Debug, FromStorage, IntoStorage {
        pub host_disconnect: bool @ 0,
        pub vbus_valid: bool @ 1,
        pub session_valid: bool @ 2,
        pub session_end: bool @ 3,
        pub id_ground: bool @ 4,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct ChargerStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// Data-plus receiver reads high.
        pub dp_high: bool @ 0,
        /// Data-minus receiver reads high.
        pub dm_high: bool @ 1,
        /// The data-minus voltage is above the data detect reference.
        pub vdat_detected: bool @ 2,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PowerControl(pub u8): Debug, FromStorage, IntoStorage {
        /// Take software control over the data lines.
        pub software_control: bool @ 0,
        /// Weak current source on data-plus, used for data contact detection.
        pub dp_weak_pullup: bool @ 1,
        /// Voltage source on data-plus.
        pub dp_source: bool @ 2,
        /// Swap the data-plus and data-minus lines.
        pub swap_dp_dm: bool @ 3,
        /// Enable the data detect comparator on data-minus.
        pub vdat_comparator: bool @ 4,
    }
}

/// Resistor ID codes, as reported by the ID status register.
const RID_FLOAT: u8 = 0b000;
const RID_GND: u8 = 0b001;
const RID_A: u8 = 0b010;
const RID_B: u8 = 0b011;
const RID_C: u8 = 0b100;

impl From<u8> for ConnectorId {
    fn from(value: u8) -> Self {
        match value {
            RID_FLOAT => ConnectorId::Floating,
            RID_GND => ConnectorId::Grounded,
            RID_A => ConnectorId::A,
            RID_B => ConnectorId::B,
            RID_C => ConnectorId::C,
            _ => ConnectorId::Unknown,
        }
    }
}

impl From<ConnectorId> for u8 {
    fn from(value: ConnectorId) -> Self {
        match value {
            ConnectorId::Floating => RID_FLOAT,
            ConnectorId::Grounded => RID_GND,
            ConnectorId::A => RID_A,
            ConnectorId::B => RID_B,
            ConnectorId::C => RID_C,
            ConnectorId::Unknown => 0b111,
        }
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct IdStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// The resolved resistor ID.
        pub rid: u8 [get ConnectorId, set ConnectorId] @ 0..=2,
        /// The ID measurement is complete.
        pub valid: bool @ 7,
    }
}

#[cfg(test)]
mod tests {
    use super::{FunctionControl, IdStatus, OperatingMode, Register};
    use crate::ConnectorId;

    #[test]
    fn test_aliases() {
        assert_eq!(Register::PowerControl.set_address(), Some(0x3E));
        assert_eq!(Register::PowerControl.clear_address(), Some(0x3F));
        assert_eq!(Register::ChargerStatus.set_address(), None);
    }

    #[test]
    fn test_id_status() {
        let status = IdStatus(0).with_rid(ConnectorId::B).with_valid(true);
        assert_eq!(status.0, 0b1000_0011);
        assert_eq!(IdStatus(0b101).rid(), ConnectorId::Unknown);
    }

    #[test]
    fn test_operating_mode() {
        let control = FunctionControl(0).with_operating_mode(OperatingMode::NonDriving);
        assert_eq!(control.0, 0b0000_1000);
        assert_eq!(control.operating_mode(), OperatingMode::NonDriving);
    }
}
