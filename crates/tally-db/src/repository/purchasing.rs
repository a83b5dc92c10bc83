//! # Purchasing Repositories
//!
//! Purchase orders, goods receipt notes and purchase invoices.

use serde_json::json;
use tally_core::{
    GoodsReceiptNote, InvoiceStatus, PurchaseInvoice, PurchaseOrder, PurchaseOrderItem,
    PurchaseOrderStatus,
};
use tracing::debug;

use super::Repository;
use crate::error::DbResult;
use crate::store::Filter;

impl Repository<PurchaseOrder> {
    pub async fn by_number(&self, po_number: &str) -> DbResult<Option<PurchaseOrder>> {
        Ok(self
            .find(&Filter::eq("po_number", po_number))
            .await?
            .into_iter()
            .next())
    }

    /// Orders still expecting stock.
    pub async fn open(&self) -> DbResult<Vec<PurchaseOrder>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|po| po.status != PurchaseOrderStatus::Received)
            .collect())
    }

    /// Writes updated item quantities together with their derived status.
    pub async fn record_receipt(&self, id: &str, items: &[PurchaseOrderItem], status: PurchaseOrderStatus) -> DbResult<()> {
        debug!(purchase_order_id = %id, status = %status, "Recording receipt on purchase order");
        self.update_by_id(id, json!({ "items": items, "status": status }))
            .await
    }
}

impl Repository<GoodsReceiptNote> {
    pub async fn for_purchase_order(&self, purchase_order_id: &str) -> DbResult<Vec<GoodsReceiptNote>> {
        self.find(&Filter::eq("purchase_order_id", purchase_order_id))
            .await
    }
}

impl Repository<PurchaseInvoice> {
    pub async fn for_receipt(&self, goods_receipt_id: &str) -> DbResult<Vec<PurchaseInvoice>> {
        self.find(&Filter::eq("goods_receipt_id", goods_receipt_id))
            .await
    }

    pub async fn unpaid(&self) -> DbResult<Vec<PurchaseInvoice>> {
        self.find(&Filter::eq(
            "status",
            serde_json::to_value(InvoiceStatus::Unpaid).unwrap_or_default(),
        ))
        .await
    }

    pub async fn mark_paid(&self, id: &str) -> DbResult<()> {
        debug!(invoice_id = %id, "Marking invoice paid");
        self.update_by_id(id, json!({ "status": InvoiceStatus::Paid }))
            .await
    }
}
