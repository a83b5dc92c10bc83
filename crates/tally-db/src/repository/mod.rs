//! # Repository Module
//!
//! Typed access to the record store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Workflow                                                               │
//! │       │  records.lots().for_variant("v1")                              │
//! │       ▼                                                                 │
//! │  Repository<Lot>                                                        │
//! │  ├── all / find / get / require                                        │
//! │  ├── insert / insert_many                                              │
//! │  ├── update_by_id / update_where                                       │
//! │  └── delete_where                                                      │
//! │       │                                                                 │
//! │       │  encode: Lot ─serde─► camelCase JSON ─casing─► snake_case row  │
//! │       │  decode: snake_case row ─casing─► camelCase JSON ─serde─► Lot  │
//! │       ▼                                                                 │
//! │  Arc<dyn RecordStore>  (SQLite Database or MemoryStore)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Filters address stored (snake_case) field names.
//!
//! ## Available Repositories
//!
//! - [`catalog`] - products, variants, lots
//! - [`sales`] - customers, transactions
//! - [`purchasing`] - purchase orders, goods receipts, invoices
//! - [`audit`] - stock adjustment logs, notifications

pub mod audit;
pub mod catalog;
pub mod purchasing;
pub mod sales;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use tally_core::casing;
use tally_core::{
    Customer, GoodsReceiptNote, Lot, Notification, Product, PurchaseInvoice, PurchaseOrder,
    StockAdjustmentLog, Transaction, Variant,
};

use crate::error::{DbError, DbResult};
use crate::store::{Collection, Filter, RecordStore, Row};

// =============================================================================
// Record
// =============================================================================

/// A domain type stored in one collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;
    /// Human name used in `NotFound` errors.
    const ENTITY: &'static str;

    fn id(&self) -> &str;
}

macro_rules! record {
    ($ty:ty, $collection:expr, $entity:literal) => {
        impl Record for $ty {
            const COLLECTION: Collection = $collection;
            const ENTITY: &'static str = $entity;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

record!(Product, Collection::Products, "Product");
record!(Variant, Collection::Variants, "Variant");
record!(Lot, Collection::Lots, "Lot");
record!(Customer, Collection::Customers, "Customer");
record!(Transaction, Collection::Transactions, "Transaction");
record!(PurchaseOrder, Collection::PurchaseOrders, "Purchase order");
record!(GoodsReceiptNote, Collection::GoodsReceipts, "Goods receipt");
record!(PurchaseInvoice, Collection::PurchaseInvoices, "Invoice");
record!(StockAdjustmentLog, Collection::StockAdjustmentLogs, "Stock adjustment");
record!(Notification, Collection::Notifications, "Notification");

// =============================================================================
// Encoding
// =============================================================================

fn into_row(collection: Collection, value: Value) -> DbResult<Row> {
    match value {
        Value::Object(row) => Ok(row),
        _ => Err(DbError::invalid(collection.name(), "record is not a JSON object")),
    }
}

/// Domain record → snake_case row.
pub fn encode<T: Record>(record: &T) -> DbResult<Row> {
    let value = serde_json::to_value(record)
        .map_err(|e| DbError::invalid(T::COLLECTION.name(), e.to_string()))?;
    into_row(T::COLLECTION, casing::to_snake(value))
}

/// snake_case row → domain record.
pub fn decode<T: Record>(row: Row) -> DbResult<T> {
    serde_json::from_value(casing::to_camel(Value::Object(row)))
        .map_err(|e| DbError::invalid(T::COLLECTION.name(), e.to_string()))
}

/// camelCase partial record → snake_case patch row.
pub fn encode_patch<T: Record>(patch: Value) -> DbResult<Row> {
    into_row(T::COLLECTION, casing::to_snake(patch))
}

// =============================================================================
// Repository
// =============================================================================

/// Typed view of one collection.
pub struct Repository<T> {
    store: Arc<dyn RecordStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Repository {
            store: Arc::clone(&self.store),
            _marker: PhantomData,
        }
    }
}

impl<T: Record> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &T::COLLECTION)
            .finish()
    }
}

impl<T: Record> Repository<T> {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Repository {
            store,
            _marker: PhantomData,
        }
    }

    pub async fn find(&self, filter: &Filter) -> DbResult<Vec<T>> {
        let rows = self.store.select(T::COLLECTION, filter).await?;
        rows.into_iter().map(decode).collect()
    }

    pub async fn all(&self) -> DbResult<Vec<T>> {
        self.find(&Filter::All).await
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<T>> {
        Ok(self.find(&Filter::id(id)).await?.into_iter().next())
    }

    /// Like [`get`](Self::get) but a missing record is an error.
    pub async fn require(&self, id: &str) -> DbResult<T> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found(T::ENTITY, id))
    }

    pub async fn insert(&self, record: &T) -> DbResult<T> {
        debug!(collection = %T::COLLECTION, id = %record.id(), "Inserting record");
        let rows = self
            .store
            .insert(T::COLLECTION, vec![encode(record)?])
            .await?;
        rows.into_iter()
            .next()
            .map(decode)
            .unwrap_or_else(|| Ok(record.clone()))
    }

    /// Inserts every record in a single store call. An empty slice is a no-op.
    pub async fn insert_many(&self, records: &[T]) -> DbResult<Vec<T>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        debug!(collection = %T::COLLECTION, count = records.len(), "Inserting records");
        let rows = records.iter().map(encode).collect::<DbResult<Vec<_>>>()?;
        let stored = self.store.insert(T::COLLECTION, rows).await?;
        stored.into_iter().map(decode).collect()
    }

    /// Applies a camelCase partial record to every match.
    pub async fn update_where(&self, filter: &Filter, patch: Value) -> DbResult<u64> {
        self.store
            .update(T::COLLECTION, filter, encode_patch::<T>(patch)?)
            .await
    }

    /// Applies a camelCase partial record to one record; it must exist.
    pub async fn update_by_id(&self, id: &str, patch: Value) -> DbResult<()> {
        match self.update_where(&Filter::id(id), patch).await? {
            0 => Err(DbError::not_found(T::ENTITY, id)),
            _ => Ok(()),
        }
    }

    pub async fn delete_where(&self, filter: &Filter) -> DbResult<u64> {
        self.store.delete(T::COLLECTION, filter).await
    }
}

// =============================================================================
// Records facade
// =============================================================================

/// Entry point to every repository over one store.
///
/// ```rust,ignore
/// let records = Records::new(Arc::new(MemoryStore::new()));
/// let variant = records.variants().by_sku("TEE-M").await?;
/// ```
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn RecordStore>,
}

impl fmt::Debug for Records {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Records").field("store", &self.store).finish()
    }
}

impl Records {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Records { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn repo<T: Record>(&self) -> Repository<T> {
        Repository::new(Arc::clone(&self.store))
    }

    pub fn products(&self) -> Repository<Product> {
        self.repo()
    }

    pub fn variants(&self) -> Repository<Variant> {
        self.repo()
    }

    pub fn lots(&self) -> Repository<Lot> {
        self.repo()
    }

    pub fn customers(&self) -> Repository<Customer> {
        self.repo()
    }

    pub fn transactions(&self) -> Repository<Transaction> {
        self.repo()
    }

    pub fn purchase_orders(&self) -> Repository<PurchaseOrder> {
        self.repo()
    }

    pub fn goods_receipts(&self) -> Repository<GoodsReceiptNote> {
        self.repo()
    }

    pub fn invoices(&self) -> Repository<PurchaseInvoice> {
        self.repo()
    }

    pub fn adjustments(&self) -> Repository<StockAdjustmentLog> {
        self.repo()
    }

    pub fn notifications(&self) -> Repository<Notification> {
        self.repo()
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tally_core::{Money, Quantity, SellingMethod, TaxRate};

    pub fn records() -> Records {
        Records::new(Arc::new(MemoryStore::new()))
    }

    pub fn variant(id: &str, product_id: &str, sku: &str) -> Variant {
        Variant {
            id: id.to_string(),
            product_id: product_id.to_string(),
            attributes: BTreeMap::from([("Size".to_string(), "M".to_string())]),
            sku: sku.to_string(),
            barcode: None,
            price: Money::from_cents(1500),
            cost: Money::from_cents(700),
            tax_rate: TaxRate::from_bps(1600),
            reorder_point: Quantity::from_units(5),
            selling_method: SellingMethod::Each,
            storage_uom: "pcs".to_string(),
        }
    }

    pub fn lot(id: &str, variant_id: &str, units: i64) -> Lot {
        Lot {
            id: id.to_string(),
            variant_id: variant_id.to_string(),
            lot_number: format!("L-{}", id),
            expiry_date: None,
            quantity: Quantity::from_units(units),
            created_at: Utc::now(),
        }
    }
}
