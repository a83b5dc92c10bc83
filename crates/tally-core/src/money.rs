//! # Money Module
//!
//! Integer money in the smallest currency unit.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Where Money flows                                                      │
//! │                                                                         │
//! │  Variant.price ──► CartItem.price ──► line total ──► Transaction.total │
//! │                                                                         │
//! │  Variant.cost ───► PurchaseOrderItem.cost ──► GRN ⋈ PO ──► invoice line│
//! │                                                                         │
//! │  Returns negate subtotal/tax/total/amountPaid: Money is signed.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::quantity::Quantity;
use crate::types::TaxRate;

/// A monetary value in cents.
///
/// Signed so that refunds and return transactions can carry negative totals.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

/// Divides with rounding half away from zero.
fn div_round(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
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

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Tax on this amount at `rate`, rounded half away from zero.
    ///
    /// ```rust
    /// use tally_core::{Money, TaxRate};
    ///
    /// let tax = Money::from_cents(1000).calculate_tax(TaxRate::from_bps(825));
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        // i128 keeps large line totals from overflowing before the division
        Money(saturate(div_round(self.0 as i128 * rate.bps() as i128, 10_000)))
    }

    /// Price × quantity for fractional quantities (weight, volume).
    ///
    /// ```rust
    /// use tally_core::{Money, Quantity};
    ///
    /// // 1.250 kg at 4.00/kg
    /// let line = Money::from_cents(400).times(Quantity::from_thousandths(1250));
    /// assert_eq!(line.cents(), 500);
    /// ```
    pub fn times(&self, quantity: Quantity) -> Money {
        Money(saturate(div_round(
            self.0 as i128 * quantity.thousandths() as i128,
            Quantity::SCALE as i128,
        )))
    }

    /// Amount including tax: `self × (1 + rate)`.
    pub fn with_tax(&self, rate: TaxRate) -> Money {
        *self + self.calculate_tax(rate)
    }

    /// Parses a decimal string such as `"12.5"` or `"-3.05"` without floats.
    pub fn parse_decimal(input: &str) -> Result<Money, ValidationError> {
        let units = parse_fixed(input, 2).ok_or_else(|| {
            ValidationError::invalid("amount", format!("'{}' is not a number", input.trim()))
        })?;
        Ok(Money(units))
    }
}

/// Clamps an intermediate product back into cents at the i64 bounds.
fn saturate(cents: i128) -> i64 {
    i64::try_from(cents).unwrap_or(if cents < 0 { i64::MIN } else { i64::MAX })
}

/// Parses a decimal string into an integer scaled by `10^places`.
///
/// Rejects more fractional digits than `places` rather than silently rounding.
pub(crate) fn parse_fixed(input: &str, places: u32) -> Option<i64> {
    let s = input.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if frac.len() > places as usize {
        return None;
    }
    let scale = 10_i64.checked_pow(places)?;
    let whole_value: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut frac_value: i64 = if frac.is_empty() { 0 } else { frac.parse().ok()? };
    for _ in frac.len()..places as usize {
        frac_value *= 10;
    }
    let value = whole_value.checked_mul(scale)?.checked_add(frac_value)?;
    Some(if negative { -value } else { value })
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
