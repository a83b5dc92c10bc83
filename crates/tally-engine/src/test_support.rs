//! Fixtures for workflow tests: a store that fails on demand and a seeded catalog.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use tally_core::{
    ledger, new_id, Lot, Money, Product, Quantity, SellingMethod, TaxRate, Variant,
};
use tally_db::{Collection, DbError, DbResult, Filter, MemoryStore, RecordStore, Records, Row};

use crate::session::UserContext;
use crate::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Select,
    Insert,
    Update,
    Delete,
}

/// Memory store that rejects chosen `(operation, collection)` pairs.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    faults: Mutex<HashSet<(Op, Collection)>>,
}

impl FaultyStore {
    pub fn fail_on(&self, op: Op, collection: Collection) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert((op, collection));
        }
    }

    pub fn heal(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    pub async fn count(&self, collection: Collection) -> usize {
        self.inner.count(collection).await
    }

    fn check(&self, op: Op, collection: Collection) -> DbResult<()> {
        let faulty = self
            .faults
            .lock()
            .map(|f| f.contains(&(op, collection)))
            .unwrap_or(false);
        if faulty {
            Err(DbError::QueryFailed(format!(
                "injected {:?} fault on {}",
                op, collection
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn select(&self, collection: Collection, filter: &Filter) -> DbResult<Vec<Row>> {
        self.check(Op::Select, collection)?;
        self.inner.select(collection, filter).await
    }

    async fn insert(&self, collection: Collection, rows: Vec<Row>) -> DbResult<Vec<Row>> {
        self.check(Op::Insert, collection)?;
        self.inner.insert(collection, rows).await
    }

    async fn update(&self, collection: Collection, filter: &Filter, patch: Row) -> DbResult<u64> {
        self.check(Op::Update, collection)?;
        self.inner.update(collection, filter, patch).await
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> DbResult<u64> {
        self.check(Op::Delete, collection)?;
        self.inner.delete(collection, filter).await
    }
}

/// An engine over a fresh [`FaultyStore`], plus a signed-in cashier.
pub struct Harness {
    pub engine: Engine,
    pub store: Arc<FaultyStore>,
    pub user: UserContext,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(FaultyStore::default());
        let records = Records::new(Arc::clone(&store) as Arc<dyn RecordStore>);
        Harness {
            engine: Engine::new(records),
            store,
            user: UserContext::new("u1", "Amina"),
        }
    }

    pub fn records(&self) -> &Records {
        self.engine.records()
    }

    /// Seeds a product with one `Each` variant priced 10.00 at 16% tax,
    /// reorder point 5, and an opening lot of `stock` units if non-zero.
    pub async fn seed(&self, name: &str, sku: &str, stock: i64) -> Variant {
        let product = Product {
            id: new_id(),
            name: name.to_string(),
            category: "General".to_string(),
            brand: "House".to_string(),
            image_url: None,
            created_at: Utc::now(),
        };
        let variant = Variant {
            id: new_id(),
            product_id: product.id.clone(),
            attributes: BTreeMap::new(),
            sku: sku.to_string(),
            barcode: None,
            price: Money::from_cents(1000),
            cost: Money::from_cents(600),
            tax_rate: TaxRate::from_bps(1600),
            reorder_point: Quantity::from_units(5),
            selling_method: SellingMethod::Each,
            storage_uom: "pcs".to_string(),
        };
        self.records().products().insert(&product).await.unwrap();
        self.records().variants().insert(&variant).await.unwrap();
        if stock != 0 {
            let lot: Lot = ledger::opening_lot(
                &variant.id,
                None,
                Quantity::from_units(stock),
                None,
                Utc::now(),
            );
            self.records().lots().insert(&lot).await.unwrap();
        }
        variant
    }

    pub async fn stock(&self, variant_id: &str) -> i64 {
        self.records()
            .lots()
            .stock_of(variant_id)
            .await
            .unwrap()
            .whole_units()
    }
}
