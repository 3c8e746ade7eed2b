//! Fixed-point currency amounts.
//!
//! Spend is tracked in millionths of a currency unit so that budget
//! arithmetic (check-and-increment, threshold comparison) is exact.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

const MICROS_PER_UNIT: i64 = 1_000_000;

/// A currency amount in micro-units (1 unit = 1 000 000 micros).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub const fn from_units(units: i64) -> Self {
        Self(units.saturating_mul(MICROS_PER_UNIT))
    }

    /// Convert a floating-point amount (as reported by billing) to the
    /// nearest micro-unit.
    pub fn from_f64(units: f64) -> Self {
        Self((units * MICROS_PER_UNIT as f64).round() as i64)
    }

    pub const fn micros(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / MICROS_PER_UNIT as f64
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Clamp to zero from below.
    pub fn non_negative(self) -> Self {
        Self(self.0.max(0))
    }

    /// Percentage of `limit` this amount represents. A zero limit is
    /// treated as fully consumed.
    pub fn percent_of(self, limit: Money) -> f64 {
        if limit.0 <= 0 {
            return 100.0;
        }
        (self.0 as f64 / limit.0 as f64) * 100.0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(self.0.saturating_neg())
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        *self = *self - rhs;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = abs / MICROS_PER_UNIT as u64;
        let micros = abs % MICROS_PER_UNIT as u64;
        write!(f, "{sign}{units}.{micros:06}")
    }
}
