//! # Validation Module
//!
//! Input validation for forms, CSV rows and cart edits.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Form / CSV row                                               │
//! │  └── THIS MODULE: shape and range checks, no store access              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: tally-core business rules (cart, purchasing, returns)        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: tally-engine application checks (SKU uniqueness)             │
//! │                                                                         │
//! │  The record store enforces no uniqueness of its own.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_sku, validate_quantity};
//! use tally_core::{Quantity, SellingMethod};
//!
//! validate_sku("TEE-RED-M").unwrap();
//! validate_quantity(Quantity::from_thousandths(1250), SellingMethod::Weight).unwrap();
//! assert!(validate_quantity(Quantity::from_thousandths(1250), SellingMethod::Each).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::quantity::{Quantity, SellingMethod};
use crate::types::TaxRate;
use crate::MAX_ITEM_UNITS;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, hyphens and underscores only
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::required("sku"));
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid(
            "sku",
            "must contain only letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Validates a product name: required, at most 200 characters.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required("name"));
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Normalises a customer phone number for lookup.
///
/// Spaces, dashes, dots and parentheses are dropped; a leading `+` is kept.
/// The result must have between 7 and 15 digits.
pub fn normalize_phone(phone: &str) -> ValidationResult<String> {
    let trimmed = phone.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::required("phone"));
    }

    let mut out = String::with_capacity(trimmed.len());
    for (idx, c) in trimmed.chars().enumerate() {
        match c {
            '+' if idx == 0 => out.push(c),
            '0'..='9' => out.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => {
                return Err(ValidationError::invalid(
                    "phone",
                    format!("unexpected character '{}'", c),
                ))
            }
        }
    }

    let digits = out.chars().filter(char::is_ascii_digit).count();
    if !(7..=15).contains(&digits) {
        return Err(ValidationError::OutOfRange {
            field: "phone digits".to_string(),
            min: 7,
            max: 15,
        });
    }

    Ok(out)
}

/// Validates a free-text reason (stock adjustments). Required, at most 500 characters.
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ValidationError::required("reason"));
    }
    if reason.len() > 500 {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: 500,
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity entered for a cart or document line.
///
/// ## Rules
/// - Must be positive
/// - Must not exceed [`MAX_ITEM_UNITS`] whole units
/// - `Each` quantities must be whole
pub fn validate_quantity(qty: Quantity, method: SellingMethod) -> ValidationResult<()> {
    if !qty.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > Quantity::from_units(MAX_ITEM_UNITS) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_UNITS,
        });
    }

    if !method.accepts(qty) {
        return Err(ValidationError::invalid(
            "quantity",
            format!("{} is not a whole number of units", qty),
        ));
    }

    Ok(())
}

/// Validates a stock count entered at adjustment time.
///
/// Zero is allowed (write-off). Fractions only for weight/volume variants.
pub fn validate_stock_count(qty: Quantity, method: SellingMethod) -> ValidationResult<()> {
    if qty < Quantity::zero() {
        return Err(ValidationError::OutOfRange {
            field: "new stock".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    if !method.accepts(qty) {
        return Err(ValidationError::invalid(
            "new stock",
            format!("{} is not a whole number of units", qty),
        ));
    }
    Ok(())
}

/// Validates a price or cost. Zero is allowed (free items).
pub fn validate_price(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a payment amount. Must be positive.
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if amount.is_negative() || amount.is_zero() {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a tax rate: 0% to 100%.
pub fn validate_tax_rate(rate: TaxRate) -> ValidationResult<()> {
    if rate.bps() > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "taxRate".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("TEE-RED-M").is_ok());
        assert!(validate_sku("ABC123").is_ok());
        assert!(validate_sku("product_1").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_product_name() {
        assert!(validate_product_name("Crew Neck Tee").is_ok());
        assert!(validate_product_name("").is_err());
        assert!(validate_product_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+254 712-345 678").unwrap(), "+254712345678");
        assert_eq!(normalize_phone("(555) 123.4567").unwrap(), "5551234567");
        assert!(normalize_phone("").is_err());
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("555-CALL-NOW").is_err());
        assert!(normalize_phone("55+51234567").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(Quantity::from_units(1), SellingMethod::Each).is_ok());
        assert!(validate_quantity(Quantity::from_units(999), SellingMethod::Each).is_ok());
        assert!(validate_quantity(Quantity::from_thousandths(250), SellingMethod::Weight).is_ok());

        assert!(validate_quantity(Quantity::zero(), SellingMethod::Each).is_err());
        assert!(validate_quantity(Quantity::from_units(-1), SellingMethod::Each).is_err());
        assert!(validate_quantity(Quantity::from_units(1000), SellingMethod::Each).is_err());
        assert!(validate_quantity(Quantity::from_thousandths(1500), SellingMethod::Each).is_err());
    }

    #[test]
    fn test_validate_stock_count() {
        assert!(validate_stock_count(Quantity::zero(), SellingMethod::Each).is_ok());
        assert!(validate_stock_count(Quantity::from_units(5000), SellingMethod::Each).is_ok());
        assert!(validate_stock_count(Quantity::from_units(-2), SellingMethod::Each).is_err());
        assert!(validate_stock_count(Quantity::from_thousandths(10), SellingMethod::Each).is_err());
    }

    #[test]
    fn test_validate_money() {
        assert!(validate_price("price", Money::zero()).is_ok());
        assert!(validate_price("price", Money::from_cents(1099)).is_ok());
        assert!(validate_price("cost", Money::from_cents(-100)).is_err());
        assert!(validate_payment_amount(Money::from_cents(1)).is_ok());
        assert!(validate_payment_amount(Money::zero()).is_err());
    }

    #[test]
    fn test_validate_tax_rate() {
        assert!(validate_tax_rate(TaxRate::zero()).is_ok());
        assert!(validate_tax_rate(TaxRate::from_bps(1600)).is_ok());
        assert!(validate_tax_rate(TaxRate::from_bps(10_000)).is_ok());
        assert!(validate_tax_rate(TaxRate::from_bps(10_001)).is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert!(validate_reason("Stock count").is_ok());
        assert!(validate_reason("  ").is_err());
    }
}
