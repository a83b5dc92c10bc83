//! # Quantity Module
//!
//! Stock quantities as fixed-point thousandths of a storage unit.
//!
//! Items sold `Each` are always whole units; `Weight` and `Volume` items carry
//! up to three decimal places (grams of a kilogram, millilitres of a litre).
//! Lot quantities are signed: sales and adjusted-out stock are negative.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::parse_fixed;

/// A signed quantity in thousandths of the variant's storage unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    /// Thousandths per whole unit.
    pub const SCALE: i64 = 1000;

    #[inline]
    pub const fn from_thousandths(value: i64) -> Self {
        Quantity(value)
    }

    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * Self::SCALE)
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn thousandths(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// True when the value has no fractional part.
    #[inline]
    pub const fn is_integral(&self) -> bool {
        self.0 % Self::SCALE == 0
    }

    /// Whole units, truncated toward zero.
    #[inline]
    pub const fn whole_units(&self) -> i64 {
        self.0 / Self::SCALE
    }

    #[inline]
    pub fn min(self, other: Quantity) -> Quantity {
        Quantity(self.0.min(other.0))
    }
}

impl FromStr for Quantity {
    type Err = ValidationError;

    /// Parses `"3"`, `"2.5"` or `"-0.125"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed(s, 3).map(Quantity).ok_or_else(|| {
            ValidationError::invalid("quantity", format!("'{}' is not a number", s.trim()))
        })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_integral() {
            return write!(f, "{}", self.whole_units());
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}{}.{:03}",
            sign,
            (self.0 / Self::SCALE).abs(),
            (self.0 % Self::SCALE).abs()
        )
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl Neg for Quantity {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Quantity(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), |acc, q| acc + q)
    }
}

impl<'a> Sum<&'a Quantity> for Quantity {
    fn sum<I: Iterator<Item = &'a Quantity>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Selling Method
// =============================================================================

/// How a variant is measured at the till.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum SellingMethod {
    /// Discrete units; quantities are always whole.
    #[default]
    Each,
    /// Sold by weight (kg, g, lb); three decimal places.
    Weight,
    /// Sold by volume (l, ml); three decimal places.
    Volume,
}

impl SellingMethod {
    /// Whether `quantity` is expressible for this selling method.
    pub fn accepts(&self, quantity: Quantity) -> bool {
        match self {
            SellingMethod::Each => quantity.is_integral(),
            SellingMethod::Weight | SellingMethod::Volume => true,
        }
    }

    /// Storage unit used when none is given.
    pub fn default_uom(&self) -> &'static str {
        match self {
            SellingMethod::Each => "pcs",
            SellingMethod::Weight => "kg",
            SellingMethod::Volume => "l",
        }
    }
}

impl FromStr for SellingMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "each" | "unit" => Ok(SellingMethod::Each),
            "weight" => Ok(SellingMethod::Weight),
            "volume" => Ok(SellingMethod::Volume),
            other => Err(ValidationError::invalid(
                "sellingMethod",
                format!("'{}' is not one of Each, Weight, Volume", other),
            )),
        }
    }
}

impl fmt::Display for SellingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SellingMethod::Each => write!(f, "Each"),
            SellingMethod::Weight => write!(f, "Weight"),
            SellingMethod::Volume => write!(f, "Volume"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        assert_eq!("3".parse::<Quantity>().unwrap(), Quantity::from_units(3));
        assert_eq!("2.5".parse::<Quantity>().unwrap().thousandths(), 2500);
        assert_eq!("-0.125".parse::<Quantity>().unwrap().thousandths(), -125);
        assert!("1.2345".parse::<Quantity>().is_err());
        assert!("ten".parse::<Quantity>().is_err());

        assert_eq!(Quantity::from_units(-3).to_string(), "-3");
        assert_eq!(Quantity::from_thousandths(2500).to_string(), "2.500");
        assert_eq!(Quantity::from_thousandths(-50).to_string(), "-0.050");
    }

    #[test]
    fn test_each_requires_whole_units() {
        assert!(SellingMethod::Each.accepts(Quantity::from_units(2)));
        assert!(!SellingMethod::Each.accepts(Quantity::from_thousandths(1500)));
        assert!(SellingMethod::Weight.accepts(Quantity::from_thousandths(1500)));
        assert!(SellingMethod::Volume.accepts(Quantity::from_thousandths(1)));
    }

    #[test]
    fn test_selling_method_from_str() {
        assert_eq!("weight".parse::<SellingMethod>().unwrap(), SellingMethod::Weight);
        assert_eq!("".parse::<SellingMethod>().unwrap(), SellingMethod::Each);
        assert!("bundle".parse::<SellingMethod>().is_err());
    }

    #[test]
    fn test_sum() {
        let lots = [
            Quantity::from_units(10),
            Quantity::from_units(-3),
            Quantity::from_thousandths(500),
        ];
        let total: Quantity = lots.iter().sum();
        assert_eq!(total.thousandths(), 7500);
    }
}
