//! Timers that are used by the hardware access port, the charger classifier and the state machine.
use core::future::Future;

use crate::config::Timing;

/// The timer trait to implement by the user application.
pub trait Timer {
    /// Expire after the specified number of microseconds.
    fn after_micros(microseconds: u64) -> impl Future<Output = ()>;
}

/// Types of timers that are used for delays and timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerType {
    /// Spacing of viewport busy polls.
    ViewportPoll,
    /// Settle time before the first data contact sample.
    DataContactSettle,
    /// Spacing of data contact samples.
    DataContactPoll,
    /// Primary detection settle time.
    PrimaryDetection,
    /// Secondary detection settle time.
    SecondaryDetection,
    /// Bounded wait for VBUS to rise.
    VbusRise,
    /// Bounded wait for VBUS to fall.
    VbusFall,
}

impl TimerType {
    /// The duration of this timer in microseconds.
    pub fn duration_micros(self, timing: &Timing) -> u64 {
        let millis = |ms: u32| u64::from(ms) * 1000;

        match self {
            TimerType::ViewportPoll => timing.viewport_poll_interval_us.into(),
            TimerType::DataContactSettle => timing.dcd_settle_us.into(),
            TimerType::DataContactPoll => millis(timing.dcd_poll_interval_ms),
            TimerType::PrimaryDetection => millis(timing.primary_detection_ms),
            TimerType::SecondaryDetection => millis(timing.secondary_detection_ms),
            TimerType::VbusRise => millis(timing.vbus_rise_timeout_ms),
            TimerType::VbusFall => millis(timing.vbus_fall_timeout_ms),
        }
    }

    /// Create a timer future for a given type.
    ///
    /// Times out after the duration that is configured in `timing`.
    pub fn get_timer<TIMER: Timer>(self, timing: &Timing) -> impl Future<Output = ()> + use<TIMER> {
        TIMER::after_micros(self.duration_micros(timing))
    }
}
