//! Lossless decimal numeric type backed by rust_decimal.
//!
//! Provides canonical parsing from strings, formatting without exponent notation
//! and the two-decimal half-up rounding every monetary step goes through.

use rust_decimal::RoundingStrategy;
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lossless decimal numeric type for financial calculations.
///
/// Backed by rust_decimal to avoid floating-point drift.
/// Serializes to JSON number (not string) by default.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    /// Create a Decimal from a RustDecimal.
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Build a Decimal from an integer mantissa and scale, e.g. `(1549, 2)` is `15.49`.
    pub fn from_parts(mantissa: i64, scale: u32) -> Self {
        Decimal(RustDecimal::new(mantissa, scale))
    }

    /// Parse a Decimal from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s.trim()).map(Decimal)
    }

    /// Format the Decimal as a canonical string (no exponent notation).
    pub fn to_canonical_string(&self) -> String {
        let normalized = self.0.normalize();
        format!("{}", normalized)
    }

    /// Format as a monetary string with exactly two decimal places.
    pub fn to_money_string(&self) -> String {
        format!("{:.2}", self.round2().0)
    }

    /// Round to 2 decimal places, midpoint away from zero (round-half-up for
    /// positive amounts).
    pub fn round2(&self) -> Self {
        Decimal(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// `round2(self * percent / 100)`.
    ///
    /// Only for figures already bounded by [`Decimal::max_amount`]; use
    /// [`Decimal::checked_percent`] on anything a client supplied.
    pub fn percent(&self, percent: Decimal) -> Self {
        (*self * percent / Decimal::hundred()).round2()
    }

    /// `round2(self * percent / 100)`, or `None` on overflow.
    pub fn checked_percent(&self, percent: Decimal) -> Option<Self> {
        Some(self.checked_mul(percent)?.checked_div(Decimal::hundred())?.round2())
    }

    pub fn checked_add(&self, rhs: Decimal) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Decimal)
    }

    pub fn checked_mul(&self, rhs: Decimal) -> Option<Self> {
        self.0.checked_mul(rhs.0).map(Decimal)
    }

    /// `None` on overflow or division by zero.
    pub fn checked_div(&self, rhs: Decimal) -> Option<Self> {
        self.0.checked_div(rhs.0).map(Decimal)
    }

    /// Largest monetary amount accepted from a client (one billion).
    pub fn max_amount() -> Self {
        Decimal(RustDecimal::new(1_000_000_000, 0))
    }

    /// Clamp negative values to zero.
    pub fn max_zero(&self) -> Self {
        if self.is_negative() {
            Decimal::zero()
        } else {
            *self
        }
    }

    /// Get the underlying RustDecimal.
    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    /// The additive identity (0).
    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    /// Returns true if the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Returns the value 100.
    pub fn hundred() -> Self {
        Decimal(RustDecimal::ONE_HUNDRED)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

// Arithmetic operations
impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl std::iter::Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, d| acc + d)
    }
}
