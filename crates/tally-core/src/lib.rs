//! # tally-core: Pure Business Logic for Tally POS
//!
//! Everything in this crate is a pure function of its inputs. Stock is never
//! stored: it is recomputed from the signed lot ledger every time it is read.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Back-office CLI / frontend                      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          tally-engine (sale, return, receiving, adjust)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  ledger   │  │purchasing │  │   cart    │  │  import   │  │   │
//! │  │   │  Lot Σ    │  │ PO status │  │  totals   │  │  CSV rows │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORE • NO NETWORK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                tally-db (record store + repositories)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Lot, Variant, Transaction, PurchaseOrder, ...)
//! - [`money`] - Integer money
//! - [`quantity`] - Fixed-point quantities (3 decimal places)
//! - [`ledger`] - Stock aggregation and lot construction
//! - [`purchasing`] - Purchase order status and invoice derivation
//! - [`cart`] - Cart editing and transaction totals
//! - [`notifications`] - Low/out-of-stock notification reconciliation
//! - [`payment`] - Idempotent payment confirmation accumulator
//! - [`casing`] - camelCase ⇄ snake_case key conversion for the store boundary
//! - [`import`] - CSV inventory bulk-load parsing
//! - [`reports`] - Sales and inventory rollups
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::{Money, Quantity, TaxRate};
//!
//! let price = Money::from_cents(250);
//! let line = price.times(Quantity::from_units(3));
//! assert_eq!(line.cents(), 750);
//! assert_eq!(line.calculate_tax(TaxRate::from_bps(1600)).cents(), 120);
//! ```

pub mod cart;
pub mod casing;
pub mod error;
pub mod import;
pub mod ledger;
pub mod money;
pub mod notifications;
pub mod payment;
pub mod purchasing;
pub mod quantity;
pub mod reports;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{ProductLedger, StockLevel, VariantLedger};
pub use money::Money;
pub use quantity::{Quantity, SellingMethod};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct variants allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single cart line, in whole storage units.
///
/// Guards against typing 1000 instead of 10 at the till.
pub const MAX_ITEM_UNITS: i64 = 999;
