//! Charger types, the charging capability record, and charger detection.
pub mod bc12;

use uom::si::electric_current::milliampere;

use crate::units::ElectricCurrent;

/// Current that a suspended peripheral may draw.
pub const SUSPEND_CURRENT_MA: u32 = 2;

/// The type of charger (or peer) that is attached to the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChargerType {
    /// Nothing attached, or the type could not be determined.
    #[default]
    None,
    /// Standard downstream port.
    Sdp,
    /// Charging downstream port.
    Cdp,
    /// Dedicated charging port.
    Dcp,
    /// Accessory charger adapter, A-side.
    AcaA,
    /// Accessory charger adapter, B-side.
    AcaB,
    /// Accessory charger adapter, C-side.
    AcaC,
    /// Accessory charger adapter dock, which powers the bus while this port is host.
    AcaDock,
    /// Proprietary charger, signalling single-ended-one on the data lines.
    Se1,
    /// A self-powered B-device, this port is host.
    BDevice,
}

impl ChargerType {
    /// The current that this charger type allows to draw.
    ///
    /// A standard downstream port is limited to 100 mA until the peripheral was configured by the host.
    pub fn current_limit(self) -> ElectricCurrent {
        let milliamps = match self {
            ChargerType::None | ChargerType::BDevice => 0,
            ChargerType::Sdp => 100,
            ChargerType::Cdp
            | ChargerType::Dcp
            | ChargerType::Se1
            | ChargerType::AcaA
            | ChargerType::AcaB
            | ChargerType::AcaC
            | ChargerType::AcaDock => 1500,
        };

        ElectricCurrent::new::<milliampere>(milliamps)
    }

    /// Whether this is one of the micro accessory charger adapter variants.
    pub fn is_micro_aca(self) -> bool {
        matches!(self, ChargerType::AcaA | ChargerType::AcaB | ChargerType::AcaC)
    }
}

/// The kind of change that a capability broadcast announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChargeEvent {
    /// A charger was connected, or its current changed.
    Connect,
    /// The charger was disconnected.
    #[default]
    Disconnect,
    /// The peripheral link was suspended.
    Suspend,
}

/// The charging capability record, as broadcast to the power supply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capability {
    /// The attached charger type.
    pub charger_type: ChargerType,
    /// The current that may be drawn.
    pub current: ElectricCurrent,
    /// The change that is announced.
    pub event: ChargeEvent,
}

impl Default for Capability {
    fn default() -> Self {
        Self::none()
    }
}

impl Capability {
    /// No charger, no current, disconnected.
    pub fn none() -> Self {
        Self {
            charger_type: ChargerType::None,
            current: ElectricCurrent::new::<milliampere>(0),
            event: ChargeEvent::Disconnect,
        }
    }

    /// A freshly connected charger of the given type, at its current limit.
    pub fn connect(charger_type: ChargerType) -> Self {
        Self {
            charger_type,
            current: charger_type.current_limit(),
            event: ChargeEvent::Connect,
        }
    }

    /// The current in milliamperes.
    pub fn milliamps(&self) -> u32 {
        self.current.get::<milliampere>()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Capability {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Capability {{ charger_type: {}, current: {} mA, event: {} }}",
            self.charger_type,
            self.milliamps(),
            self.event
        )
    }
}
