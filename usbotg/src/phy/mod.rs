//! The hardware access port, which reads and writes PHY registers through a [`Viewport`].
//!
//! Every transaction polls the viewport busy status with a bounded budget. When the budget is
//! exhausted, the transaction fails with [`PhyError::Busy`] and the PHY is flagged as stuck. The
//! caller treats this as a hard failure for its current operation, there are no automatic retries.
#[allow(missing_docs)]
pub mod registers;

pub mod platform;

use core::marker::PhantomData;

use registers::Register;
use usbotg_traits::{Access, Viewport, ViewportStatus};

use crate::config::Timing;
use crate::counters::Counter;
use crate::timers::{Timer, TimerType};

/// Errors that can occur during PHY register access.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhyError {
    /// The viewport stayed busy for the whole polling budget.
    #[error("PHY viewport busy at register {register:#04x}")]
    Busy {
        /// Address of the register that was accessed.
        register: u8,
    },
}

/// Register access to a PHY.
#[derive(Debug)]
pub struct Phy<V: Viewport, TIMER: Timer> {
    viewport: V,
    timing: Timing,
    stuck: bool,
    _timer: PhantomData<TIMER>,
}

impl<V: Viewport, TIMER: Timer> Phy<V, TIMER> {
    /// Create a new hardware access port on top of a `viewport`.
    pub fn new(viewport: V, timing: Timing) -> Self {
        Self {
            viewport,
            timing,
            stuck: false,
            _timer: PhantomData,
        }
    }

    /// Whether the last transaction exhausted its busy polling budget.
    pub fn is_stuck(&self) -> bool {
        self.stuck
    }

    /// The underlying viewport.
    pub fn viewport(&mut self) -> &mut V {
        &mut self.viewport
    }

    async fn transact(&mut self, access: Access) -> Result<u8, PhyError> {
        let register = access.register();
        let mut budget = Counter::new(self.timing.viewport_poll_budget);

        self.viewport.start(access);

        loop {
            match self.viewport.status() {
                ViewportStatus::Done(value) => {
                    trace!("PHY access {:?} done: {:?}", access, value);
                    self.stuck = false;
                    return Ok(value);
                }
                ViewportStatus::Busy => {
                    if budget.increment().is_err() {
                        error!("PHY stuck, register {:?} stayed busy", register);
                        self.stuck = true;
                        return Err(PhyError::Busy { register });
                    }

                    TimerType::ViewportPoll.get_timer::<TIMER>(&self.timing).await;
                }
            }
        }
    }

    /// Read a register by address.
    pub async fn read_raw(&mut self, register: u8) -> Result<u8, PhyError> {
        self.transact(Access::Read { register }).await
    }

    /// Write a register by address.
    pub async fn write_raw(&mut self, register: u8, value: u8) -> Result<(), PhyError> {
        self.transact(Access::Write { register, value }).await.map(|_| ())
    }

    /// Read a register into its typed representation.
    pub async fn read<R: From<u8>>(&mut self, register: Register) -> Result<R, PhyError> {
        Ok(R::from(self.read_raw(register.address()).await?))
    }

    /// Write a register from its typed representation.
    pub async fn write<R: Into<u8>>(&mut self, register: Register, value: R) -> Result<(), PhyError> {
        self.write_raw(register.address(), value.into()).await
    }

    /// Set the bits of `mask` in a register, leaving all others untouched.
    ///
    /// Uses the set alias, where the register has one. Otherwise, does read-modify-write.
    pub async fn set_bits<R: Into<u8>>(&mut self, register: Register, mask: R) -> Result<(), PhyError> {
        let mask = mask.into();

        match register.set_address() {
            Some(address) => self.write_raw(address, mask).await,
            None => {
                let value = self.read_raw(register.address()).await?;
                self.write_raw(register.address(), value | mask).await
            }
        }
    }

    /// Clear the bits of `mask` in a register, leaving all others untouched.
    ///
    /// Uses the clear alias, where the register has one. Otherwise, does read-modify-write.
    pub async fn clear_bits<R: Into<u8>>(&mut self, register: Register, mask: R) -> Result<(), PhyError> {
        let mask = mask.into();

        match register.clear_address() {
            Some(address) => self.write_raw(address, mask).await,
            None => {
                let value = self.read_raw(register.address()).await?;
                self.write_raw(register.address(), value & !mask).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::registers::{OtgControl, PowerControl, Register};
    use super::{Phy, PhyError};
    use crate::config::Timing;
    use crate::dummy::{DummyTimer, FakeViewport};

    fn get_phy() -> Phy<FakeViewport, DummyTimer> {
        Phy::new(FakeViewport::new(), Timing::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_and_clear_aliases() {
        let mut phy = get_phy();

        phy.set_bits(Register::PowerControl, PowerControl(0).with_dp_source(true).with_swap_dp_dm(true))
            .await
            .unwrap();
        phy.clear_bits(Register::PowerControl, PowerControl(0).with_swap_dp_dm(true))
            .await
            .unwrap();

        let control: PowerControl = phy.read(Register::PowerControl).await.unwrap();
        assert!(control.dp_source());
        assert!(!control.swap_dp_dm());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_busy() {
        let mut phy = get_phy();
        phy.viewport().busy_polls = 10;

        phy.write(Register::OtgControl, OtgControl(0).with_drive_vbus(true))
            .await
            .unwrap();

        assert!(!phy.is_stuck());
        assert!(phy.viewport().otg_control().drive_vbus());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck() {
        let mut phy = get_phy();
        phy.viewport().stuck = true;

        let start = Instant::now();
        let result = phy.read_raw(Register::ChargerStatus.address()).await;

        assert_eq!(result, Err(PhyError::Busy { register: 0x38 }));
        assert!(phy.is_stuck());

        // 200 polls, spaced by at least 5 us.
        assert!(start.elapsed().as_micros() >= 1000);

        // The next successful access clears the condition.
        phy.viewport().stuck = false;
        phy.read_raw(Register::ChargerStatus.address()).await.unwrap();
        assert!(!phy.is_stuck());
    }
}
