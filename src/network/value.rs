use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// Three-valued logic value used during the search
///
/// Values start unknown and become fixed as implications and decisions progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Val3 {
    /// Unassigned
    #[default]
    X,
    /// Logic 0
    Zero,
    /// Logic 1
    One,
}

impl Val3 {
    /// Convert a boolean to a known value
    pub fn from_bool(b: bool) -> Val3 {
        if b {
            Val3::One
        } else {
            Val3::Zero
        }
    }

    /// Return the boolean value, if known
    pub fn to_bool(self) -> Option<bool> {
        match self {
            Val3::X => None,
            Val3::Zero => Some(false),
            Val3::One => Some(true),
        }
    }

    /// Whether the value is 0 or 1
    pub fn is_known(self) -> bool {
        self != Val3::X
    }

    /// Whether the value is X
    pub fn is_unknown(self) -> bool {
        self == Val3::X
    }

    /// Three-valued conjunction
    pub fn and(self, other: Val3) -> Val3 {
        match (self, other) {
            (Val3::Zero, _) | (_, Val3::Zero) => Val3::Zero,
            (Val3::One, Val3::One) => Val3::One,
            _ => Val3::X,
        }
    }

    /// Three-valued disjunction
    pub fn or(self, other: Val3) -> Val3 {
        match (self, other) {
            (Val3::One, _) | (_, Val3::One) => Val3::One,
            (Val3::Zero, Val3::Zero) => Val3::Zero,
            _ => Val3::X,
        }
    }

    /// Three-valued exclusive or
    pub fn xor(self, other: Val3) -> Val3 {
        match (self.to_bool(), other.to_bool()) {
            (Some(a), Some(b)) => Val3::from_bool(a ^ b),
            _ => Val3::X,
        }
    }

    /// Negate the value if the flag is set
    pub fn invert_if(self, inv: bool) -> Val3 {
        if inv {
            !self
        } else {
            self
        }
    }

    /// Whether two values are both known and different
    pub fn conflicts_with(self, other: Val3) -> bool {
        self.is_known() && other.is_known() && self != other
    }
}

impl Not for Val3 {
    type Output = Val3;

    fn not(self) -> Val3 {
        match self {
            Val3::X => Val3::X,
            Val3::Zero => Val3::One,
            Val3::One => Val3::Zero,
        }
    }
}

impl From<bool> for Val3 {
    fn from(b: bool) -> Val3 {
        Val3::from_bool(b)
    }
}

impl fmt::Display for Val3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val3::X => write!(f, "X"),
            Val3::Zero => write!(f, "0"),
            Val3::One => write!(f, "1"),
        }
    }
}

/// Number of simulation lanes in a packed value
pub const NB_LANES: usize = 64;

/// 64 two-valued simulation lanes packed in a machine word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedVal(pub u64);

impl PackedVal {
    /// All lanes at 0
    pub const ZERO: PackedVal = PackedVal(0);
    /// All lanes at 1
    pub const ONES: PackedVal = PackedVal(!0);

    /// Broadcast a boolean to all lanes
    pub fn splat(b: bool) -> PackedVal {
        if b {
            PackedVal::ONES
        } else {
            PackedVal::ZERO
        }
    }

    /// Value with a single lane set
    pub fn lane_mask(lane: usize) -> PackedVal {
        debug_assert!(lane < NB_LANES);
        PackedVal(1u64 << lane)
    }

    /// Value of a single lane
    pub fn lane(self, lane: usize) -> bool {
        (self.0 >> lane) & 1 != 0
    }

    /// Set a single lane
    pub fn set_lane(&mut self, lane: usize, b: bool) {
        if b {
            self.0 |= 1u64 << lane;
        } else {
            self.0 &= !(1u64 << lane);
        }
    }

    /// Whether no lane is set
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Index of the lowest set lane
    pub fn lowest_lane(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Number of set lanes
    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Keep only the first `nb` lanes
    pub fn truncate(self, nb: usize) -> PackedVal {
        if nb >= NB_LANES {
            self
        } else {
            PackedVal(self.0 & ((1u64 << nb) - 1))
        }
    }

    /// Lanes where the two values differ
    pub fn diff(self, other: PackedVal) -> PackedVal {
        self ^ other
    }

    /// Negate the value if the flag is set
    pub fn invert_if(self, inv: bool) -> PackedVal {
        if inv {
            !self
        } else {
            self
        }
    }
}

impl Not for PackedVal {
    type Output = PackedVal;

    fn not(self) -> PackedVal {
        PackedVal(!self.0)
    }
}

impl BitAnd for PackedVal {
    type Output = PackedVal;

    fn bitand(self, rhs: PackedVal) -> PackedVal {
        PackedVal(self.0 & rhs.0)
    }
}

impl BitOr for PackedVal {
    type Output = PackedVal;

    fn bitor(self, rhs: PackedVal) -> PackedVal {
        PackedVal(self.0 | rhs.0)
    }
}

impl BitXor for PackedVal {
    type Output = PackedVal;

    fn bitxor(self, rhs: PackedVal) -> PackedVal {
        PackedVal(self.0 ^ rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_val3_ops() {
        use Val3::*;
        assert_eq!(!X, X);
        assert_eq!(!Zero, One);
        assert_eq!(Zero.and(X), Zero);
        assert_eq!(One.and(X), X);
        assert_eq!(One.or(X), One);
        assert_eq!(Zero.or(Zero), Zero);
        assert_eq!(One.xor(One), Zero);
        assert_eq!(One.xor(X), X);
        assert!(One.conflicts_with(Zero));
        assert!(!One.conflicts_with(X));
        assert_eq!(Val3::from(true).invert_if(true), Zero);
    }

    #[test]
    fn test_packed_lanes() {
        let mut v = PackedVal::ZERO;
        v.set_lane(3, true);
        v.set_lane(10, true);
        assert_eq!(v.lowest_lane(), Some(3));
        assert_eq!(v.count(), 2);
        assert!(v.lane(10));
        assert!(!v.lane(4));
        assert_eq!(v.truncate(4), PackedVal::lane_mask(3));
        assert_eq!((!PackedVal::ZERO), PackedVal::ONES);
        assert!(PackedVal::ZERO.lowest_lane().is_none());
    }
}
