//! # Record Store
//!
//! The four-call interface every workflow is written against.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     RecordStore                                         │
//! │                                                                         │
//! │  select(collection, filter)        → rows                              │
//! │  insert(collection, rows)          → rows as stored                    │
//! │  update(collection, filter, patch) → matched count                     │
//! │  delete(collection, filter)        → deleted count                     │
//! │                                                                         │
//! │  Each call is atomic on its own. Nothing spans two calls, which is     │
//! │  why multi-step workflows need explicit compensation.                  │
//! │                                                                         │
//! │      ┌──────────────┐         ┌──────────────┐                         │
//! │      │   Database   │         │ MemoryStore  │                         │
//! │      │  (SQLite)    │         │ (tests)      │                         │
//! │      └──────────────┘         └──────────────┘                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are JSON objects with snake_case keys and a string `id`.

pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{DbError, DbResult};

/// A stored record: a JSON object with snake_case keys.
pub type Row = Map<String, Value>;

// =============================================================================
// Collection
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Products,
    Variants,
    Lots,
    Customers,
    Transactions,
    PurchaseOrders,
    GoodsReceipts,
    PurchaseInvoices,
    StockAdjustmentLogs,
    Notifications,
}

impl Collection {
    pub const ALL: [Collection; 10] = [
        Collection::Products,
        Collection::Variants,
        Collection::Lots,
        Collection::Customers,
        Collection::Transactions,
        Collection::PurchaseOrders,
        Collection::GoodsReceipts,
        Collection::PurchaseInvoices,
        Collection::StockAdjustmentLogs,
        Collection::Notifications,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Variants => "variants",
            Collection::Lots => "lots",
            Collection::Customers => "customers",
            Collection::Transactions => "transactions",
            Collection::PurchaseOrders => "purchase_orders",
            Collection::GoodsReceipts => "goods_receipt_notes",
            Collection::PurchaseInvoices => "purchase_invoices",
            Collection::StockAdjustmentLogs => "stock_adjustment_logs",
            Collection::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Filter
// =============================================================================

/// Row predicate over top-level snake_case fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(String, Value),
    In(String, Vec<Value>),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::Eq(field.into(), value.into())
    }

    pub fn id(id: impl Into<String>) -> Filter {
        Filter::Eq("id".to_string(), Value::String(id.into()))
    }

    pub fn one_of<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Filter {
        Filter::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::All => other,
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => row.get(field).unwrap_or(&Value::Null) == value,
            Filter::In(field, values) => {
                let actual = row.get(field).unwrap_or(&Value::Null);
                values.iter().any(|v| v == actual)
            }
            Filter::And(parts) => parts.iter().all(|f| f.matches(row)),
        }
    }

    /// The id this filter pins, if it is a plain id lookup.
    pub fn pinned_id(&self) -> Option<&str> {
        match self {
            Filter::Eq(field, Value::String(id)) if field == "id" => Some(id),
            _ => None,
        }
    }
}

/// Extracts the record id of a row.
pub fn row_id(collection: Collection, row: &Row) -> DbResult<String> {
    match row.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        _ => Err(DbError::invalid(collection.name(), "row has no string id")),
    }
}

/// Merges a patch into a row. The id is never overwritten.
pub fn apply_patch(row: &mut Row, patch: &Row) {
    for (key, value) in patch {
        if key != "id" {
            row.insert(key.clone(), value.clone());
        }
    }
}

// =============================================================================
// Trait
// =============================================================================

#[async_trait]
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Rows matching `filter`, in insertion order.
    async fn select(&self, collection: Collection, filter: &Filter) -> DbResult<Vec<Row>>;

    /// Inserts all rows or none. Ids must be unique within the collection.
    async fn insert(&self, collection: Collection, rows: Vec<Row>) -> DbResult<Vec<Row>>;

    /// Merges `patch` into every matching row.
    async fn update(&self, collection: Collection, filter: &Filter, patch: Row) -> DbResult<u64>;

    async fn delete(&self, collection: Collection, filter: &Filter) -> DbResult<u64>;
}
