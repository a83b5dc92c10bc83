//! # tally-db: Record Store Layer for Tally POS
//!
//! Every read and write the workflows make goes through the four-call
//! [`RecordStore`] interface. Two implementations ship: the SQLite
//! [`Database`] and the in-process [`MemoryStore`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Data Flow                              │
//! │                                                                         │
//! │  tally-engine workflow (record_sale, receive_goods, adjust_stock)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  Repositories │    │  RecordStore  │    │  Migrations  │  │   │
//! │  │   │               │    │               │    │  (embedded)  │  │   │
//! │  │   │ Repository<T> │───►│ Database      │    │ 001_records  │  │   │
//! │  │   │ Records       │    │ MemoryStore   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/tally-pos/tally.db                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - The `RecordStore` trait, collections, filters, memory store
//! - [`pool`] - SQLite pool creation and the SQLite `RecordStore`
//! - [`migrations`] - Embedded migrations
//! - [`repository`] - Typed repositories and the key-case boundary
//! - [`error`] - Store error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("tally.db")).await?;
//! let records = db.records();
//! let stock = records.lots().stock_of(&variant_id).await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::{Record, Records, Repository};
pub use store::memory::MemoryStore;
pub use store::{Collection, Filter, RecordStore, Row};
