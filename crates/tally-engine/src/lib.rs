//! # tally-engine: Workflows for Tally POS
//!
//! Multi-step operations over the record store. The store offers no
//! transactions spanning calls, so each workflow orders its writes so the
//! first one is the record of truth and everything after it can be retried
//! or reconciled by hand.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Data Flow                              │
//! │                                                                         │
//! │  apps/backoffice (CLI)          till front end (Checkout)              │
//! │       │                               │                                 │
//! │       ▼                               ▼                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   tally-engine (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │  recorder    sale ──► lots (−)     return ──► lots (+)          │   │
//! │  │  documents   PO ──► GRN ──► lots (+) ──► PO status ──► invoice  │   │
//! │  │  stock       audit log ──► delete lots ──► one adjustment lot   │   │
//! │  │  catalog     products ──► variants ──► opening lots             │   │
//! │  │  inventory   lots ──► stock, notifications, reports             │   │
//! │  │                                                                 │   │
//! │  │  saga: every write phase runs detached and reports partial      │   │
//! │  │        failure with the ids it left behind                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tally-db (Records over a RecordStore)     tally-core (pure rules)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_engine::{Engine, UserContext};
//!
//! let engine = Engine::new(db.records());
//! let log = engine
//!     .adjust_stock(&user, &variant_id, Quantity::from_units(12), "stock take")
//!     .await?;
//! ```

pub mod catalog;
pub mod checkout;
pub mod documents;
pub mod error;
pub mod inventory;
pub mod recorder;
pub mod saga;
pub mod session;
pub mod stock;

#[cfg(test)]
mod test_support;

use tally_db::Records;

// =============================================================================
// Re-exports
// =============================================================================

pub use catalog::{ImportSummary, NewProduct, NewVariant, OpeningLot};
pub use checkout::{Checkout, PaymentOutcome};
pub use documents::{NewInvoice, NewPurchaseOrder, OrderLine};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use inventory::{InventorySnapshot, InventoryView};
pub use recorder::SaleRequest;
pub use saga::{Saga, SagaState};
pub use session::{LocalSession, SessionEvent, SessionProvider, UserContext};
pub use stock::Shortfall;

/// Entry point for every workflow. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Engine {
    records: Records,
}

impl Engine {
    pub fn new(records: Records) -> Self {
        Engine { records }
    }

    pub fn records(&self) -> &Records {
        &self.records
    }
}
