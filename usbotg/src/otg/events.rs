//! Event bitmasks that producers post to the state machine.
//!
//! Only presence matters. Posting a bit that is already pending has no additional effect.
use core::ops::{BitAnd, BitOr, BitOrAssign};

use proc_bitfield::bitfield;

bitfield! {
    /// Events from the hardware, sensed on VBUS and the connector ID pin.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct OtgEvents(pub u16): Debug, FromStorage, IntoStorage {
        /// VBUS rose above the valid threshold.
        pub vbus_valid: bool @ 0,
        /// VBUS fell below the session end threshold.
        pub vbus_end: bool @ 1,
        /// The connector ID changed.
        pub id_change: bool @ 2,
        /// The peripheral link reported a new power draw.
        pub peripheral_draw: bool @ 3,
    }
}

bitfield! {
    /// Administrative requests.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct UserEvents(pub u8): Debug, FromStorage, IntoStorage {
        /// Force the A-role (host).
        pub force_a: bool @ 0,
        /// Force the B-role (peripheral).
        pub force_b: bool @ 1,
        /// Drop the bus, releasing VBUS.
        pub bus_drop: bool @ 2,
    }
}

macro_rules! impl_event_set {
    ($name:ident) => {
        impl $name {
            /// No events.
            pub const NONE: Self = Self(0);

            /// Whether no event is set.
            pub fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Whether all events of `other` are set.
            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Remove the events of `other`.
            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }
    };
}

impl_event_set!(OtgEvents);
impl_event_set!(UserEvents);

impl OtgEvents {
    /// VBUS valid.
    pub const VBUS_VALID: Self = Self(1 << 0);
    /// VBUS end.
    pub const VBUS_END: Self = Self(1 << 1);
    /// Connector ID change.
    pub const ID_CHANGE: Self = Self(1 << 2);
    /// Peripheral power draw change.
    pub const PERIPHERAL_DRAW: Self = Self(1 << 3);
}

impl UserEvents {
    /// Force A-role.
    pub const FORCE_A: Self = Self(1 << 0);
    /// Force B-role.
    pub const FORCE_B: Self = Self(1 << 1);
    /// Bus drop.
    pub const BUS_DROP: Self = Self(1 << 2);
}

#[cfg(test)]
mod tests {
    use super::{OtgEvents, UserEvents};

    #[test]
    fn test_constants_match_fields() {
        assert!(OtgEvents::VBUS_VALID.vbus_valid());
        assert!(OtgEvents::VBUS_END.vbus_end());
        assert!(OtgEvents::ID_CHANGE.id_change());
        assert!(OtgEvents::PERIPHERAL_DRAW.peripheral_draw());

        assert!(UserEvents::FORCE_A.force_a());
        assert!(UserEvents::FORCE_B.force_b());
        assert!(UserEvents::BUS_DROP.bus_drop());
    }

    #[test]
    fn test_set_operations() {
        let mut pending = OtgEvents::VBUS_VALID | OtgEvents::ID_CHANGE;
        pending |= OtgEvents::VBUS_VALID;

        let mask = OtgEvents::VBUS_VALID | OtgEvents::VBUS_END;
        let taken = pending & mask;
        assert_eq!(taken, OtgEvents::VBUS_VALID);

        pending.remove(taken);
        assert_eq!(pending, OtgEvents::ID_CHANGE);
        assert!(!pending.contains(OtgEvents::VBUS_VALID));

        pending.remove(OtgEvents::ID_CHANGE);
        assert!(pending.is_empty());
    }
}
