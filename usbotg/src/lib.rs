//! USB OTG dual-role orchestration for `[no_std]`.
//!
//! Decides which role a single USB port assumes (host or peripheral), detects the type of an
//! attached charger per USB Battery Charging, and broadcasts the resulting charging capability.
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

// This must go first, as it provides the logging macros.
#[macro_use]
mod fmt;

pub mod charger;
pub mod config;
pub mod counters;
pub mod otg;
pub mod phy;
pub mod timers;

#[cfg(test)]
mod dummy;

#[macro_use]
extern crate uom;

#[allow(missing_docs)]
pub mod units {
    ISQ!(
        uom::si,
        u32,
        (millimeter, kilogram, second, milliampere, kelvin, mole, candela)
    );
}

/// State of the connector ID pin, as resolved from its resistance to ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectorId {
    /// No ID resistance, a B-type plug or nothing is attached.
    Floating,
    /// ID is shorted to ground, an A-type plug is attached.
    Grounded,
    /// Accessory charger adapter, A-side resistance.
    A,
    /// Accessory charger adapter, B-side resistance.
    B,
    /// Accessory charger adapter, C-side resistance.
    C,
    /// The resistance does not match any known code.
    Unknown,
}

impl ConnectorId {
    /// Whether the ID resolves to an accessory charger adapter, or an unrecognized resistance.
    pub fn is_accessory(self) -> bool {
        matches!(self, Self::A | Self::B | Self::C | Self::Unknown)
    }
}
