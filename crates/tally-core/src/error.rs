//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input shape/range failures                     │
//! │                                                                         │
//! │  tally-db errors                                                       │
//! │  └── DbError          - Record store failures                          │
//! │                                                                         │
//! │  tally-engine errors                                                   │
//! │  └── EngineError      - Validation / Backend / PartialFailure /        │
//! │                         Consistency, as shown to the operator          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every rejection in this crate happens before any store call is made.

use thiserror::Error;

use crate::quantity::Quantity;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations detected by pure code.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The cart has nothing to sell.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Variant is not a line of the cart.
    #[error("Variant {0} is not in the cart")]
    NotInCart(String),

    /// Settled payments do not cover the total.
    ///
    /// ## When This Occurs
    /// - Recording a sale before the payment accumulator is settled
    #[error("Payment of {paid} does not cover total {total}")]
    Underpaid { paid: String, total: String },

    /// A return was attempted against something that is not a completed sale.
    #[error("Transaction {transaction_id} cannot be returned: {reason}")]
    NotReturnable {
        transaction_id: String,
        reason: String,
    },

    /// Returned quantity is larger than what the original sale sold.
    #[error("Cannot return {requested} of {sku}: only {sold} sold")]
    ReturnExceedsSold {
        sku: String,
        sold: Quantity,
        requested: Quantity,
    },

    /// Return line references a variant the original sale never contained.
    #[error("Variant {variant_id} is not part of transaction {transaction_id}")]
    NotOnTransaction {
        transaction_id: String,
        variant_id: String,
    },

    /// Receipt line references a variant the purchase order never ordered.
    #[error("Variant {variant_id} is not on purchase order {po_number}")]
    NotOnPurchaseOrder {
        po_number: String,
        variant_id: String,
    },

    /// Purchase order is fully received; nothing more can be booked against it.
    #[error("Purchase order {0} is already fully received")]
    PurchaseOrderClosed(String),

    /// Invoice status only moves Unpaid → Paid.
    #[error("Invoice {0} is already paid")]
    InvoiceAlreadyPaid(String),

    /// The CSV import produced one or more row errors; nothing was imported.
    #[error("Import rejected: {} row error(s)", .0.len())]
    ImportRejected(Vec<ImportRowError>),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// One rejected CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row}: {message}")]
pub struct ImportRowError {
    /// 1-based data row number (the header is row 0).
    pub row: usize,
    pub message: String,
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before business logic runs; reported inline to the form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., non-numeric price, malformed date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value inside one request (e.g., same SKU twice).
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
