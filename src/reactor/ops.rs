//! Interest-set mask over read/write readiness

use mio::Interest;
use std::fmt;
use std::ops::{BitOr, Sub};

/// Subset of {READ, WRITE} the selector should notify about for a channel.
///
/// Unlike `mio::Interest` the mask can be empty; an empty mask means the
/// channel is not registered with the OS poller at all.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Ops(u8);

const READ_BIT: u8 = 0b01;
const WRITE_BIT: u8 = 0b10;

impl Ops {
    pub const READ: Ops = Ops(READ_BIT);
    pub const WRITE: Ops = Ops(WRITE_BIT);

    pub const fn empty() -> Ops {
        Ops(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Ops) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub(crate) const fn bits(self) -> u8 {
        self.0
    }

    pub(crate) const fn from_bits(bits: u8) -> Ops {
        Ops(bits & (READ_BIT | WRITE_BIT))
    }

    /// Convert to the poller's interest type; `None` when empty.
    pub(crate) fn to_interest(self) -> Option<Interest> {
        match (self.contains(Ops::READ), self.contains(Ops::WRITE)) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

impl BitOr for Ops {
    type Output = Ops;

    fn bitor(self, rhs: Ops) -> Ops {
        Ops(self.0 | rhs.0)
    }
}

impl Sub for Ops {
    type Output = Ops;

    fn sub(self, rhs: Ops) -> Ops {
        Ops(self.0 & !rhs.0)
    }
}

impl fmt::Debug for Ops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.contains(Ops::READ), self.contains(Ops::WRITE)) {
            (true, true) => write!(f, "READ|WRITE"),
            (true, false) => write!(f, "READ"),
            (false, true) => write!(f, "WRITE"),
            (false, false) => write!(f, "NONE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_algebra() {
        let both = Ops::READ | Ops::WRITE;
        assert!(both.contains(Ops::READ));
        assert!(both.contains(Ops::WRITE));

        let write_only = both - Ops::READ;
        assert!(!write_only.contains(Ops::READ));
        assert!(write_only.contains(Ops::WRITE));

        assert!((write_only - Ops::WRITE).is_empty());
        assert!(!Ops::empty().contains(Ops::READ));
    }

    #[test]
    fn interest_conversion() {
        assert!(Ops::empty().to_interest().is_none());
        assert_eq!(Ops::READ.to_interest(), Some(Interest::READABLE));
        assert_eq!(
            (Ops::READ | Ops::WRITE).to_interest(),
            Some(Interest::READABLE | Interest::WRITABLE)
        );
    }

    #[test]
    fn debug_rendering() {
        assert_eq!(format!("{:?}", Ops::READ | Ops::WRITE), "READ|WRITE");
        assert_eq!(format!("{:?}", Ops::empty()), "NONE");
    }
}
