use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};

/// Signed amount in minor currency units (kobo, cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const fn from_minor(value: i64) -> Self {
        Amount(value)
    }

    pub const fn minor(&self) -> i64 {
        self.0
    }

    pub const fn zero() -> Self {
        Amount(0)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Share of this amount in basis points, rounded half away from zero.
    pub fn basis_points(&self, bps: u32) -> Amount {
        let scaled = self.0 as i128 * bps as i128;
        let rounded = if scaled >= 0 {
            (scaled + 5_000) / 10_000
        } else {
            (scaled - 5_000) / 10_000
        };
        Amount(rounded as i64)
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, other: Amount) -> Amount {
        Amount(self.0 + other.0)
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, other: Amount) -> Amount {
        Amount(self.0 - other.0)
    }
}

impl Neg for Amount {
    type Output = Amount;
    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        Amount(iter.map(|a| a.0).sum())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn two_percent_of_five_thousand_is_one_hundred() {
        assert_eq!(Amount::from_minor(5_000).basis_points(200), Amount::from_minor(100));
    }

    #[test]
    fn basis_points_round_half_up() {
        // 2% of 125 = 2.5
        assert_eq!(Amount::from_minor(125).basis_points(200), Amount::from_minor(3));
        // 2% of 124 = 2.48
        assert_eq!(Amount::from_minor(124).basis_points(200), Amount::from_minor(2));
    }

    proptest! {
        #[test]
        fn fee_never_exceeds_amount(amount in 0i64..1_000_000_000_000) {
            let a = Amount::from_minor(amount);
            let fee = a.basis_points(200);
            prop_assert!(fee >= Amount::zero());
            prop_assert!(fee <= a);
            prop_assert_eq!((a - fee) + fee, a);
        }
    }
}
