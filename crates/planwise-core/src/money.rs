//! # Money Module
//!
//! Provides the `Money` type used for every derived total (annual expense
//! totals, premiums, the cost report).
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Records store dollars as JSON numbers:                                 │
//! │    0.1 + 0.2 = 0.30000000000000004                                      │
//! │                                                                         │
//! │  Summing twelve months of 33.33 in floats drifts by fractions of a     │
//! │  cent, and the drift shows up in a "$399.96" vs "$399.95" label.       │
//! │                                                                         │
//! │  OUR SOLUTION: convert once at the edge, then integer cents            │
//! │    Money::from_dollars(33.33) → 3333 cents                             │
//! │    3333 × 12 = 39996 cents → "$399.96"                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use planwise_core::money::Money;
//!
//! let monthly = Money::from_dollars(50.0);
//! let total = monthly * 3;
//! assert_eq!(total.to_string(), "$150.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// ## Design Decisions
/// - **i64 (signed)**: a discount larger than the premiums yields a negative total
/// - **Saturating arithmetic**: record amounts are unbounded, so totals clamp
///   at the i64 range instead of overflowing
/// - **Single field tuple struct**: zero-cost wrapper over i64
/// - **Serialized as cents**: the UI divides by 100 for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use planwise_core::money::Money;
    ///
    /// let premium = Money::from_cents(30000); // $300.00
    /// assert_eq!(premium.cents(), 30000);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Converts a dollar amount as stored in a record.
    ///
    /// Rounds half away from zero to the nearest cent. Non-finite input maps
    /// to zero; the schema rejects it before it gets here anyway.
    ///
    /// ## Example
    /// ```rust
    /// use planwise_core::money::Money;
    ///
    /// assert_eq!(Money::from_dollars(10.995).cents(), 1100);
    /// assert_eq!(Money::from_dollars(0.1 + 0.2).cents(), 30);
    /// ```
    pub fn from_dollars(dollars: f64) -> Self {
        if !dollars.is_finite() {
            return Money::zero();
        }
        Money((dollars * 100.0).round() as i64)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-dollar portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns the value as floating dollars, for JSON consumers.
    #[inline]
    pub fn as_dollars(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns `percent`% of this amount, rounded to the nearest cent.
    ///
    /// The percentage is first converted to basis points so the math stays
    /// in integers: `(cents × bps + 5000) / 10000`.
    ///
    /// ## Example
    /// ```rust
    /// use planwise_core::money::Money;
    ///
    /// let cost = Money::from_cents(10050); // $100.50
    /// assert_eq!(cost.percent_of(20.0).cents(), 2010);
    /// assert_eq!(cost.percent_of(100.0), cost);
    /// ```
    pub fn percent_of(&self, percent: f64) -> Money {
        let bps = if percent.is_finite() {
            (percent * 100.0).round() as i128
        } else {
            0
        };
        // i128 keeps large yearly totals from overflowing
        let cents = (self.0 as i128 * bps + 5000).div_euclid(10000);
        Money(cents.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    /// Clamps to zero from below.
    #[inline]
    pub fn non_negative(self) -> Money {
        if self.0 < 0 {
            Money::zero()
        } else {
            self
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money the way expense lists display it (`$150.00`).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

/// Multiplication by a month count.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, count: i64) -> Self {
        Money(self.0.saturating_mul(count))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dollars_rounds_to_cents() {
        assert_eq!(Money::from_dollars(50.0).cents(), 5000);
        assert_eq!(Money::from_dollars(33.333).cents(), 3333);
        assert_eq!(Money::from_dollars(0.005).cents(), 1);
        assert_eq!(Money::from_dollars(f64::NAN).cents(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(15000).to_string(), "$150.00");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-550).to_string(), "-$5.50");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);

        assert_eq!((a + b).cents(), 1250);
        assert_eq!((a - b).cents(), 750);
        assert_eq!((a * 12).cents(), 12000);

        let total: Money = [a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 1500);
    }

    #[test]
    fn test_twelve_months_do_not_drift() {
        let monthly = Money::from_dollars(33.33);
        assert_eq!((monthly * 12).to_string(), "$399.96");
    }

    #[test]
    fn test_percent_of() {
        let cost = Money::from_cents(12345);
        assert_eq!(cost.percent_of(0.0), Money::zero());
        assert_eq!(cost.percent_of(100.0), cost);
        // 12345 × 10% = 1234.5 → 1235
        assert_eq!(cost.percent_of(10.0).cents(), 1235);
        assert_eq!(cost.percent_of(12.5).cents(), 1543);
    }

    #[test]
    fn test_arithmetic_saturates() {
        let max = Money::from_dollars(1e17);
        assert_eq!(max.cents(), i64::MAX);

        assert_eq!(max * 12, max);
        assert_eq!(max + Money::from_cents(1), max);
        assert_eq!(
            Money::from_cents(i64::MIN) - Money::from_cents(1),
            Money::from_cents(i64::MIN)
        );
        assert_eq!(max.percent_of(200.0), max);

        let mut total = max;
        total += max;
        assert_eq!(total, max);
    }

    #[test]
    fn test_non_negative() {
        assert_eq!(Money::from_cents(-1).non_negative(), Money::zero());
        assert_eq!(Money::from_cents(7).non_negative().cents(), 7);
    }
}
