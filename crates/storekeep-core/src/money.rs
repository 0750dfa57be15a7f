//! # Money Module
//!
//! `Money` for monetary values and `Percentage` for discount and tax rates.
//!
//! ## Fixed-Point, Never Float
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Money      = i64 minor units (cents), scale 2                          │
//! │  Quantity   = i64 thousandths,          scale 3   (see quantity.rs)     │
//! │  Percentage = u32 basis points,         1 bp = 0.01%                    │
//! │                                                                         │
//! │  Every product of two fixed-point values is computed in i128 and       │
//! │  reduced back to cents with ROUND HALF UP:                              │
//! │                                                                         │
//! │    0.825 → 0.83     0.824 → 0.82     −0.825 → −0.83                     │
//! │                                                                         │
//! │  Totals only match the historical ledger if this rule is exact.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use storekeep_core::money::{Money, Percentage};
//!
//! let price = Money::from_cents(1000);           // 10.00
//! let tax = price.percent_of(Percentage::from_bps(825)); // 8.25%
//! assert_eq!(tax, Some(Money::from_cents(83)));  // 0.825 → 0.83
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::quantity::Quantity;

/// Divides `numerator` by a positive `denominator`, rounding half away from zero.
///
/// For non-negative inputs this is the classic round-half-up.
pub(crate) fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0);
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// Signed amount in cents.
///
/// Negative amounts are legal: a short till has a negative difference.
/// Stored as a plain INTEGER column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(i64);

impl Money {
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub const fn zero() -> Self {
        Money(0)
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// `None` if the sum leaves the i64 range.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    fn from_wide(cents: i128) -> Option<Money> {
        i64::try_from(cents).ok().map(Money)
    }

    /// Applies a percentage to this amount, rounding half up to the cent.
    ///
    /// Used for both the per-unit discount and the line tax. `None` when the
    /// rounded result does not fit in i64 cents.
    ///
    /// ```rust
    /// use storekeep_core::money::{Money, Percentage};
    ///
    /// let amount = Money::from_cents(1999);
    /// // 19.99 × 12.5% = 2.49875 → 2.50
    /// assert_eq!(amount.percent_of(Percentage::from_bps(1250)), Some(Money::from_cents(250)));
    /// ```
    pub fn percent_of(&self, rate: Percentage) -> Option<Money> {
        Money::from_wide(div_round_half_up(
            self.0 as i128 * rate.bps() as i128,
            10_000,
        ))
    }

    /// Multiplies a unit amount by a (fractional) quantity, rounding half up.
    ///
    /// ```rust
    /// use storekeep_core::money::Money;
    /// use storekeep_core::quantity::Quantity;
    ///
    /// let per_kilo = Money::from_cents(1299);
    /// // 1.255 kg × 12.99 = 16.30245 → 16.30
    /// assert_eq!(per_kilo.times(Quantity::from_milli(1255)), Some(Money::from_cents(1630)));
    ///
    /// // 4 × 2^62 cents does not fit
    /// assert_eq!(Money::from_cents(1 << 62).times(Quantity::from_units(4)), None);
    /// ```
    pub fn times(&self, quantity: Quantity) -> Option<Money> {
        Money::from_wide(div_round_half_up(
            self.0 as i128 * quantity.milli() as i128,
            Quantity::SCALE as i128,
        ))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// `-12.05` style, two decimals, no currency symbol.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.0.unsigned_abs();
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

/// Unchecked arithmetic on cents. Sale, closing and valuation totals go
/// through `checked_add`/`checked_sub` instead.
macro_rules! cents_arith {
    ($($op:ident::$method:ident, $assign:ident::$assign_method:ident => $sym:tt;)*) => {$(
        impl $op for Money {
            type Output = Money;
            fn $method(self, rhs: Money) -> Money {
                Money(self.0 $sym rhs.0)
            }
        }

        impl $assign for Money {
            fn $assign_method(&mut self, rhs: Money) {
                *self = *self $sym rhs;
            }
        }
    )*};
}

cents_arith! {
    Add::add, AddAssign::add_assign => +;
    Sub::sub, SubAssign::sub_assign => -;
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Percentage
// =============================================================================

/// A percentage in basis points (bps).
///
/// 1 basis point = 0.01%, so 1600 bps = 16%, 10000 bps = 100%.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Percentage(u32);

impl Percentage {
    /// 100%.
    pub const FULL: Percentage = Percentage(10_000);

    pub const fn from_bps(bps: u32) -> Self {
        Percentage(bps)
    }

    /// Whole percent, for convenience in seeds and tests.
    pub const fn from_percent(pct: u32) -> Self {
        Percentage(pct * 100)
    }

    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Percentage(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_stays_in_cents() {
        let mut drawer = Money::from_cents(10_000);
        drawer += Money::from_cents(1_099);
        drawer -= Money::from_cents(99);
        assert_eq!(drawer.cents(), 11_000);
        assert_eq!((Money::from_cents(500) - Money::from_cents(750)).cents(), -250);
        assert!(Money::default().is_zero());
    }

    #[test]
    fn test_renders_two_decimals() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Percentage::from_bps(825).to_string(), "8.25%");
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(div_round_half_up(825, 100), 8);
        assert_eq!(div_round_half_up(850, 100), 9);
        assert_eq!(div_round_half_up(849, 100), 8);
        assert_eq!(div_round_half_up(-850, 100), -9);
        assert_eq!(div_round_half_up(-849, 100), -8);
        assert_eq!(div_round_half_up(0, 100), 0);
    }

    #[test]
    fn test_percent_of_rounds_half_up_not_to_even() {
        // 10.00 × 8.25% = 0.825 → 0.83
        let tax = Money::from_cents(1000).percent_of(Percentage::from_bps(825));
        assert_eq!(tax, Some(Money::from_cents(83)));

        // 0.50 × 5% = 0.025 → 0.03 (bankers rounding would give 0.02)
        let tax = Money::from_cents(50).percent_of(Percentage::from_percent(5));
        assert_eq!(tax, Some(Money::from_cents(3)));
    }

    #[test]
    fn test_times_fractional_quantity() {
        let unit = Money::from_cents(299);
        assert_eq!(unit.times(Quantity::from_units(3)), Some(Money::from_cents(897)));
        // 0.5 × 0.03 = 0.015 → 0.02
        assert_eq!(
            Money::from_cents(3).times(Quantity::from_milli(500)),
            Some(Money::from_cents(2))
        );
    }

    #[test]
    fn test_out_of_range_products_are_none() {
        let huge = Money::from_cents(1 << 62);
        assert_eq!(huge.times(Quantity::from_units(4)), None);
        assert_eq!(huge.times(Quantity::from_units(1)), Some(huge));
        let max = Money::from_cents(i64::MAX);
        assert_eq!(max.percent_of(Percentage::FULL), Some(max));
        assert_eq!(huge.checked_add(huge), None);
        assert_eq!(Money::from_cents(i64::MIN).checked_sub(Money::from_cents(1)), None);
        assert_eq!(
            Money::from_cents(100).checked_sub(Money::from_cents(250)),
            Some(Money::from_cents(-150))
        );
    }

    #[test]
    fn test_sum_and_neg() {
        let total: Money = [100, 250, -50].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.cents(), 300);
        assert_eq!((-total).cents(), -300);
    }
}
