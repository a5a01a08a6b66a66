//! USB OTG library traits.
//!
//! Provides a register viewport trait that allows to add support for various USB transceivers (PHYs).
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

/// A single transaction on the PHY register viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    /// Read the register at the given address.
    Read {
        /// Register address.
        register: u8,
    },
    /// Write a value to the register at the given address.
    Write {
        /// Register address.
        register: u8,
        /// Value to write.
        value: u8,
    },
}

impl Access {
    /// The register address this transaction targets.
    pub fn register(&self) -> u8 {
        match self {
            Access::Read { register } | Access::Write { register, .. } => *register,
        }
    }
}

/// Status of the viewport, sampled after a transaction was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ViewportStatus {
    /// The transaction is still in progress.
    Busy,
    /// The transaction completed.
    ///
    /// Holds the data byte for reads. The value is unspecified for writes.
    Done(u8),
}

/// Viewport trait, through which the hardware access port talks to the PHY.
///
/// Implementations must not block. Waiting for completion is done by the caller,
/// which polls [`Viewport::status`] with a bounded budget.
pub trait Viewport {
    /// Start a register transaction.
    fn start(&mut self, access: Access);

    /// Sample the busy status of the last started transaction.
    fn status(&mut self) -> ViewportStatus;
}
