//! Bounded counters, used for polling and retry budgets.

/// Counter errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The counter exceeded its maximum value.
    Exceeded,
}

/// A counter that fails once it is incremented past its maximum value.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counter {
    value: u16,
    max_value: u16,
}

impl Counter {
    /// Create a counter that allows `max_value` increments.
    pub fn new(max_value: u16) -> Self {
        Self { value: 0, max_value }
    }

    /// The current value.
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Increment the counter.
    ///
    /// Returns an error once the maximum value would be exceeded. The value saturates in that case.
    pub fn increment(&mut self) -> Result<(), Error> {
        if self.value >= self.max_value {
            Err(Error::Exceeded)
        } else {
            self.value += 1;
            Ok(())
        }
    }

    /// Reset the counter to zero.
    pub fn reset(&mut self) {
        self.value = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{Counter, Error};

    #[test]
    fn test_exceeded() {
        let mut counter = Counter::new(2);

        assert_eq!(counter.increment(), Ok(()));
        assert_eq!(counter.increment(), Ok(()));
        assert_eq!(counter.increment(), Err(Error::Exceeded));
        assert_eq!(counter.value(), 2);

        counter.reset();
        assert_eq!(counter.value(), 0);
        assert_eq!(counter.increment(), Ok(()));
    }
}
