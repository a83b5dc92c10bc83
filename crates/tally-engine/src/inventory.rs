//! # Inventory Read Side
//!
//! Stock is never stored as a number. Every read loads the lots and folds
//! them per variant and per product:
//!
//! ```text
//!   products ─┐
//!   variants ─┼──► ledger::assemble ──► [ProductLedger] ──► stock / level / valuation
//!   lots ─────┘                                │
//!                                              └──► notifications::reconcile
//!                                                       │
//!                                             insert new, delete cleared
//! ```
//!
//! [`InventoryView`] keeps the last good snapshot for a screen that polls.

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use tally_core::ledger::{self, ProductLedger};
use tally_core::notifications;
use tally_core::reports::{self, SalesReport};
use tally_core::{Money, Notification, Quantity, ValidationError};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::Engine;

impl Engine {
    /// Every product with its variants and their lots.
    pub async fn load_inventory(&self) -> EngineResult<Vec<ProductLedger>> {
        let products = self.records().products().all().await?;
        let variants = self.records().variants().all().await?;
        let lots = self.records().lots().all().await?;
        debug!(
            products = products.len(),
            variants = variants.len(),
            lots = lots.len(),
            "Loaded inventory"
        );
        Ok(ledger::assemble(products, variants, lots))
    }

    pub async fn variant_stock(&self, variant_id: &str) -> EngineResult<Quantity> {
        self.records().variants().require(variant_id).await?;
        Ok(self.records().lots().stock_of(variant_id).await?)
    }

    pub async fn product_stock(&self, product_id: &str) -> EngineResult<Quantity> {
        self.records().products().require(product_id).await?;
        let mut total = Quantity::zero();
        for variant in self.records().variants().for_product(product_id).await? {
            total += self.records().lots().stock_of(&variant.id).await?;
        }
        Ok(total)
    }

    /// Recomputes stock notifications and stores the difference.
    ///
    /// Notifications whose condition still holds keep their id and read flag;
    /// only their message is rewritten.
    pub async fn refresh_notifications(&self) -> EngineResult<Vec<Notification>> {
        let ledgers = self.load_inventory().await?;
        self.reconcile_notifications(&ledgers).await
    }

    async fn reconcile_notifications(&self, ledgers: &[ProductLedger]) -> EngineResult<Vec<Notification>> {
        let existing = self.records().notifications().all().await?;
        let diff = notifications::reconcile(&existing, ledgers, Utc::now());
        if diff.is_noop() {
            return Ok(diff.current);
        }

        self.records()
            .notifications()
            .insert_many(&diff.to_insert)
            .await?;
        for kept in &diff.to_update {
            self.records()
                .notifications()
                .set_message(&kept.id, &kept.message)
                .await?;
        }
        self.records()
            .notifications()
            .delete_ids(&diff.to_delete)
            .await?;
        info!(
            added = diff.to_insert.len(),
            updated = diff.to_update.len(),
            cleared = diff.to_delete.len(),
            unread = notifications::unread_count(&diff.current),
            "Stock notifications updated"
        );
        Ok(diff.current)
    }

    pub async fn mark_notification_read(&self, notification_id: &str) -> EngineResult<()> {
        self.records()
            .notifications()
            .require(notification_id)
            .await?;
        self.records().notifications().mark_read(notification_id).await?;
        Ok(())
    }

    /// Sales, returns and tenders for the calendar days `from..=to` (UTC).
    pub async fn sales_report(&self, from: NaiveDate, to: NaiveDate, top: usize) -> EngineResult<SalesReport> {
        if to < from {
            return Err(ValidationError::invalid("to", "must not be before the start date").into());
        }
        let start = from.and_time(NaiveTime::MIN).and_utc();
        let end = (to + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
        let transactions = self.records().transactions().between(start, end).await?;
        Ok(SalesReport::build(from, to, &transactions, top))
    }
}

// =============================================================================
// Cached view
// =============================================================================

/// The last successfully loaded inventory and notification set.
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    pub products: Vec<ProductLedger>,
    pub notifications: Vec<Notification>,
}

impl InventorySnapshot {
    pub fn valuation(&self) -> Money {
        reports::inventory_valuation(&self.products)
    }

    pub fn unread(&self) -> usize {
        notifications::unread_count(&self.notifications)
    }
}

/// Inventory cache for polling screens.
///
/// A failed refresh is logged and leaves the previous snapshot in place.
#[derive(Debug, Clone)]
pub struct InventoryView {
    engine: Engine,
    snapshot: Arc<RwLock<InventorySnapshot>>,
}

impl InventoryView {
    pub fn new(engine: Engine) -> Self {
        InventoryView {
            engine,
            snapshot: Arc::new(RwLock::new(InventorySnapshot::default())),
        }
    }

    pub async fn snapshot(&self) -> InventorySnapshot {
        self.snapshot.read().await.clone()
    }

    /// Reloads stock and notifications. Returns whether the snapshot changed.
    pub async fn refresh(&self) -> bool {
        let result = async {
            let products = self.engine.load_inventory().await?;
            let notifications = self.engine.reconcile_notifications(&products).await?;
            EngineResult::Ok(InventorySnapshot {
                products,
                notifications,
            })
        }
        .await;

        match result {
            Ok(fresh) => {
                *self.snapshot.write().await = fresh;
                true
            }
            Err(e) => {
                warn!(error = %e, "Inventory refresh failed, keeping last snapshot");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::recorder::SaleRequest;
    use crate::test_support::{Harness, Op};
    use tally_core::{CartItem, NotificationKind};
    use tally_db::Collection;

    #[tokio::test]
    async fn test_product_stock_sums_variants() {
        let h = Harness::new();
        let a = h.seed("Mug", "MUG-A", 4).await;
        let mut b = a.clone();
        b.id = tally_core::new_id();
        b.sku = "MUG-B".to_string();
        h.records().variants().insert(&b).await.unwrap();
        h.engine.adjust_stock(&h.user, &b.id, Quantity::from_units(6), "count").await.unwrap();

        assert_eq!(h.engine.variant_stock(&a.id).await.unwrap(), Quantity::from_units(4));
        assert_eq!(
            h.engine.product_stock(&a.product_id).await.unwrap(),
            Quantity::from_units(10)
        );

        let first = h.engine.load_inventory().await.unwrap();
        let second = h.engine.load_inventory().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].stock(), Quantity::from_units(10));
        // 10 units at cost 6.00
        assert_eq!(reports::inventory_valuation(&first), Money::from_cents(6000));

        let err = h.engine.variant_stock("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_low_stock_notification_lifecycle() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 2).await;

        let current = h.engine.refresh_notifications().await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].kind, NotificationKind::LowStock);
        assert!(!current[0].read);

        h.engine.mark_notification_read(&current[0].id).await.unwrap();
        let again = h.engine.refresh_notifications().await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, current[0].id);
        assert!(again[0].read);
        assert_eq!(h.store.count(Collection::Notifications).await, 1);

        // Still low at 1; same row, new figure, still read.
        h.engine.adjust_stock(&h.user, &v.id, Quantity::from_units(1), "count").await.unwrap();
        h.engine.refresh_notifications().await.unwrap();
        let stored = h.records().notifications().require(&current[0].id).await.unwrap();
        assert!(stored.message.contains("1 pcs left"));
        assert!(stored.read);

        h.engine.adjust_stock(&h.user, &v.id, Quantity::from_units(20), "delivery").await.unwrap();
        assert!(h.engine.refresh_notifications().await.unwrap().is_empty());
        assert_eq!(h.store.count(Collection::Notifications).await, 0);
    }

    #[tokio::test]
    async fn test_out_of_stock_replaces_low_stock() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 2).await;
        h.engine.refresh_notifications().await.unwrap();

        h.engine.adjust_stock(&h.user, &v.id, Quantity::zero(), "broken").await.unwrap();
        let current = h.engine.refresh_notifications().await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].kind, NotificationKind::OutOfStock);
        assert_eq!(h.store.count(Collection::Notifications).await, 1);
    }

    #[tokio::test]
    async fn test_view_keeps_last_snapshot_on_failure() {
        let h = Harness::new();
        h.seed("Mug", "MUG", 3).await;
        let view = InventoryView::new(h.engine.clone());

        assert!(view.refresh().await);
        let before = view.snapshot().await;
        assert_eq!(before.products.len(), 1);
        assert_eq!(before.unread(), 1);

        h.store.fail_on(Op::Select, Collection::Lots);
        assert!(!view.refresh().await);
        assert_eq!(view.snapshot().await.products, before.products);
        assert_eq!(view.snapshot().await.valuation(), Money::from_cents(1800));
    }

    #[tokio::test]
    async fn test_sales_report_covers_whole_days() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 10).await;
        let items = vec![CartItem::from_variant("Mug", &v, Quantity::from_units(2))];
        let tx = h
            .engine
            .record_sale(
                &h.user,
                SaleRequest {
                    items,
                    tenders: vec![tally_core::PaymentTender {
                        method: tally_core::PaymentMethod::Cash,
                        amount: Money::from_cents(2320),
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let today = tx.date.date_naive();
        let report = h.engine.sales_report(today, today, 5).await.unwrap();
        assert_eq!(report.summary.sale_count, 1);
        assert_eq!(report.top_sellers[0].variant_id, v.id);

        let yesterday = today - Duration::days(1);
        let empty = h.engine.sales_report(yesterday, yesterday, 5).await.unwrap();
        assert_eq!(empty.summary.sale_count, 0);

        let err = h.engine.sales_report(today, yesterday, 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
