//! # Stock Mutation Engine
//!
//! Every change to stock is a lot insert, except the destructive adjustment.
//!
//! ## Mutations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Event            Lots written                      Lot number          │
//! │  ───────────────  ────────────────────────────────  ─────────────────── │
//! │  Sale             one −q per sold variant           SALE-{txId}         │
//! │  Return           one +q per returned variant       RET-{returnId}      │
//! │  Goods receipt    one +q per received variant       GRN-{grnId}         │
//! │  Adjustment       log, delete all, one lot of N     ADJ-{timestamp}     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here re-checks availability at write time. Two terminals selling
//! the last unit both succeed and stock goes negative; an adjustment racing a
//! sale loses the sale's lot. Both are accepted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::ledger::{self, StockLine};
use tally_core::validation::{validate_reason, validate_stock_count};
use tally_core::{new_id, Lot, Quantity, StockAdjustmentLog};
use tally_db::{DbResult, Records};
use tracing::{debug, info};

use crate::error::EngineResult;
use crate::saga::{self, Saga};
use crate::session::UserContext;
use crate::Engine;

// =============================================================================
// Lot Writers
// =============================================================================

/// Writes one negative lot per sold variant.
pub async fn record_sale_lots(records: &Records, transaction_id: &str, lines: &[StockLine], at: DateTime<Utc>) -> DbResult<Vec<Lot>> {
    let lots: Vec<Lot> = ledger::merge_positive(lines)
        .iter()
        .map(|l| ledger::sale_lot(transaction_id, l, at))
        .collect();
    debug!(transaction_id = %transaction_id, lots = lots.len(), "Writing sale lots");
    records.lots().insert_many(&lots).await
}

/// Writes one positive lot per returned variant.
pub async fn restore_returned_lots(records: &Records, return_id: &str, lines: &[StockLine], at: DateTime<Utc>) -> DbResult<Vec<Lot>> {
    let lots: Vec<Lot> = ledger::merge_positive(lines)
        .iter()
        .map(|l| ledger::return_lot(return_id, l, at))
        .collect();
    debug!(return_id = %return_id, lots = lots.len(), "Writing return lots");
    records.lots().insert_many(&lots).await
}

/// Writes one positive lot per received variant. Lines with quantity ≤ 0 are skipped.
pub async fn receive_lots(records: &Records, goods_receipt_id: &str, lines: &[StockLine], at: DateTime<Utc>) -> DbResult<Vec<Lot>> {
    let lots: Vec<Lot> = ledger::merge_positive(lines)
        .iter()
        .map(|l| ledger::receipt_lot(goods_receipt_id, l, at))
        .collect();
    debug!(goods_receipt_id = %goods_receipt_id, lots = lots.len(), "Writing receipt lots");
    records.lots().insert_many(&lots).await
}

// =============================================================================
// Availability
// =============================================================================

/// A cart line asking for more than is currently on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shortfall {
    pub variant_id: String,
    pub requested: Quantity,
    pub available: Quantity,
}

impl Engine {
    /// Lines that exceed current stock. Advisory only: sales are never blocked on it.
    pub async fn check_availability(&self, lines: &[StockLine]) -> EngineResult<Vec<Shortfall>> {
        let mut short = Vec::new();
        for line in ledger::merge_positive(lines) {
            let available = self.records().lots().stock_of(&line.variant_id).await?;
            if line.quantity > available {
                short.push(Shortfall {
                    variant_id: line.variant_id,
                    requested: line.quantity,
                    available,
                });
            }
        }
        Ok(short)
    }

    // =========================================================================
    // Adjustment
    // =========================================================================

    /// Overwrites a variant's stock with an absolute count.
    ///
    /// ## Sequence
    /// 1. Audit log with the stock as read now and `new_stock`
    /// 2. Delete every lot of the variant
    /// 3. Insert one lot of `new_stock`
    ///
    /// A failure at step 1 changes nothing. A failure at step 2 or 3 is a
    /// partial failure: the log is written and, after step 2, the variant has
    /// no lots until the count is re-entered.
    pub async fn adjust_stock(&self, user: &UserContext, variant_id: &str, new_stock: Quantity, reason: &str) -> EngineResult<StockAdjustmentLog> {
        validate_reason(reason)?;
        let variant = self.records().variants().require(variant_id).await?;
        validate_stock_count(new_stock, variant.selling_method)?;

        let previous_stock = self.records().lots().stock_of(variant_id).await?;
        let now = Utc::now();
        let log = StockAdjustmentLog {
            id: new_id(),
            date: now,
            user: user.user_id.clone(),
            variant_id: variant.id.clone(),
            previous_stock,
            new_stock,
            reason: reason.trim().to_string(),
        };

        info!(
            variant_id = %variant.id,
            sku = %variant.sku,
            previous = %previous_stock,
            new = %new_stock,
            user_id = %user.user_id,
            "Adjusting stock"
        );

        let records = self.records().clone();
        let sku = variant.sku;
        saga::detached("adjust_stock", async move {
            let mut saga = Saga::start("adjust_stock");

            if let Err(e) = records.adjustments().insert(&log).await {
                return Err(saga.fail(e.into(), "adjustment log not written"));
            }
            saga.commit("audit_log", [log.id.clone()]);

            if let Err(e) = records.lots().delete_for_variant(&log.variant_id).await {
                return Err(saga.fail(
                    e.into(),
                    format!(
                        "adjustment of {} was logged but stock was not changed; retry the adjustment",
                        sku
                    ),
                ));
            }
            saga.commit("delete_lots", Vec::new());

            let lot = ledger::adjustment_lot(&log.variant_id, new_stock, now);
            if let Err(e) = records.lots().insert(&lot).await {
                return Err(saga.fail(
                    e.into(),
                    format!(
                        "all lots of {} were removed but the new count was not saved; re-enter {} manually",
                        sku, new_stock
                    ),
                ));
            }
            saga.commit("adjustment_lot", [lot.id]);
            saga.complete();
            Ok(log)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ErrorKind};
    use crate::test_support::{Harness, Op};
    use tally_db::Collection;

    #[tokio::test]
    async fn test_adjust_overwrites_stock_with_one_lot() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 10).await;
        record_sale_lots(h.records(), "t1", &[StockLine::new(&v.id, Quantity::from_units(3))], Utc::now())
            .await
            .unwrap();
        assert_eq!(h.stock(&v.id).await, 7);

        let log = h
            .engine
            .adjust_stock(&h.user, &v.id, Quantity::from_units(4), " recount ")
            .await
            .unwrap();

        assert_eq!(log.previous_stock, Quantity::from_units(7));
        assert_eq!(log.new_stock, Quantity::from_units(4));
        assert_eq!(log.reason, "recount");
        assert_eq!(log.user, "u1");
        assert_eq!(h.stock(&v.id).await, 4);

        let lots = h.records().lots().for_variant(&v.id).await.unwrap();
        assert_eq!(lots.len(), 1);
        assert!(lots[0].lot_number.starts_with("ADJ-"));
        assert_eq!(h.records().adjustments().for_variant(&v.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_adjust_to_zero_keeps_one_lot() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 3).await;
        h.engine
            .adjust_stock(&h.user, &v.id, Quantity::zero(), "damaged")
            .await
            .unwrap();
        assert_eq!(h.stock(&v.id).await, 0);
        assert_eq!(h.records().lots().for_variant(&v.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_adjust_rejects_bad_input_before_writing() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 3).await;

        let err = h
            .engine
            .adjust_stock(&h.user, &v.id, Quantity::from_units(2), "  ")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h
            .engine
            .adjust_stock(&h.user, &v.id, Quantity::from_thousandths(2500), "recount")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h
            .engine
            .adjust_stock(&h.user, "missing", Quantity::from_units(2), "recount")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert_eq!(h.store.count(Collection::StockAdjustmentLogs).await, 0);
        assert_eq!(h.stock(&v.id).await, 3);
    }

    #[tokio::test]
    async fn test_adjust_log_failure_is_clean() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 3).await;
        h.store.fail_on(Op::Insert, Collection::StockAdjustmentLogs);

        let err = h
            .engine
            .adjust_stock(&h.user, &v.id, Quantity::from_units(9), "recount")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(h.stock(&v.id).await, 3);
    }

    #[tokio::test]
    async fn test_adjust_delete_failure_is_partial() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 3).await;
        h.store.fail_on(Op::Delete, Collection::Lots);

        let err = h
            .engine
            .adjust_stock(&h.user, &v.id, Quantity::from_units(9), "recount")
            .await
            .unwrap_err();
        assert!(err.is_partial_failure());
        assert_eq!(h.store.count(Collection::StockAdjustmentLogs).await, 1);
        assert_eq!(h.stock(&v.id).await, 3);
    }

    #[tokio::test]
    async fn test_adjust_lot_failure_leaves_variant_empty() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 3).await;
        h.store.fail_on(Op::Insert, Collection::Lots);

        let err = h
            .engine
            .adjust_stock(&h.user, &v.id, Quantity::from_units(9), "recount")
            .await
            .unwrap_err();
        match &err {
            EngineError::PartialFailure {
                workflow,
                entity_ids,
                message,
                ..
            } => {
                assert_eq!(*workflow, "adjust_stock");
                assert_eq!(entity_ids.len(), 1);
                assert!(message.contains("re-enter 9"));
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
        h.store.heal();
        assert_eq!(h.stock(&v.id).await, 0);
    }

    #[tokio::test]
    async fn test_sale_then_return_restores_stock() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 10).await;
        let line = StockLine::new(&v.id, Quantity::from_units(3));

        let sold = record_sale_lots(h.records(), "t1", &[line.clone()], Utc::now())
            .await
            .unwrap();
        assert_eq!(sold.len(), 1);
        assert_eq!(sold[0].quantity, Quantity::from_units(-3));
        assert_eq!(sold[0].lot_number, "SALE-t1");

        restore_returned_lots(h.records(), "r1", &[line], Utc::now())
            .await
            .unwrap();
        assert_eq!(h.stock(&v.id).await, 10);
    }

    #[tokio::test]
    async fn test_receive_lots_skips_non_positive_lines() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 0).await;
        let w = h.seed("Bowl", "BOWL", 0).await;

        let lots = receive_lots(
            h.records(),
            "g1",
            &[
                StockLine::new(&v.id, Quantity::from_units(5)),
                StockLine::new(&w.id, Quantity::zero()),
                StockLine::new(&v.id, Quantity::from_units(2)),
            ],
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].lot_number, "GRN-g1");
        assert_eq!(h.stock(&v.id).await, 7);
        assert_eq!(h.stock(&w.id).await, 0);
    }

    #[tokio::test]
    async fn test_check_availability_is_advisory() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 2).await;
        let w = h.seed("Bowl", "BOWL", 9).await;

        let short = h
            .engine
            .check_availability(&[
                StockLine::new(&v.id, Quantity::from_units(3)),
                StockLine::new(&w.id, Quantity::from_units(3)),
            ])
            .await
            .unwrap();
        assert_eq!(
            short,
            vec![Shortfall {
                variant_id: v.id.clone(),
                requested: Quantity::from_units(3),
                available: Quantity::from_units(2),
            }]
        );
    }
}
