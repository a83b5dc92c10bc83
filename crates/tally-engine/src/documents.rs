//! # Document Workflows
//!
//! Purchase orders, goods receipts and supplier invoices.
//!
//! ## Goods Receipt
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  read PO ──► apply receipt to items (pure) ──► derive status            │
//! │                                                                         │
//! │  ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ detached write phase ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─   │
//! │                                                                         │
//! │  1. insert GRN          fails: clean error, nothing written             │
//! │  2. insert +q lots      fails: partial failure, GRN stays               │
//! │  3. update PO items     fails: partial failure, GRN and stock stay      │
//! │     and status                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing is retried automatically. Two receipts against the same order at
//! the same moment each compute items from what they read; the later PO
//! update wins.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use tally_core::ledger::{self, StockLine};
use tally_core::purchasing;
use tally_core::validation::{validate_price, validate_quantity};
use tally_core::{
    new_id, CoreError, GoodsReceiptItem, GoodsReceiptNote, InvoiceLine, InvoiceStatus, Money,
    PurchaseInvoice, PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus, Quantity,
    ValidationError,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::saga::{self, Saga};
use crate::stock;
use crate::Engine;

/// `PO-20260518-3FA2` style number.
fn document_number(prefix: &str, at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        prefix,
        at.format("%Y%m%d"),
        suffix[..4].to_uppercase()
    )
}

fn required(field: &str, value: &str) -> EngineResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::required(field).into());
    }
    Ok(value.to_string())
}

/// Positive lines merged per variant. Nothing left is a validation error.
fn receivable(lines: &[StockLine]) -> EngineResult<Vec<StockLine>> {
    let lines = ledger::merge_positive(lines);
    if lines.is_empty() {
        return Err(ValidationError::required("received quantities").into());
    }
    Ok(lines)
}

// =============================================================================
// Inputs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub variant_id: String,
    pub quantity: Quantity,
    /// Unit cost; defaults to the variant's cost.
    #[serde(default)]
    pub cost: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPurchaseOrder {
    pub supplier: String,
    #[serde(default)]
    pub expected_delivery_date: Option<NaiveDate>,
    pub lines: Vec<OrderLine>,
}

/// A supplier invoice entered by hand, with no goods receipt behind it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInvoice {
    pub invoice_number: String,
    pub supplier: String,
    pub due_date: NaiveDate,
    pub items: Vec<InvoiceLine>,
}

impl Engine {
    // =========================================================================
    // Purchase Orders
    // =========================================================================

    pub async fn create_purchase_order(&self, order: NewPurchaseOrder) -> EngineResult<PurchaseOrder> {
        let supplier = required("supplier", &order.supplier)?;
        if order.lines.is_empty() {
            return Err(ValidationError::required("items").into());
        }

        // One line per variant; later duplicates add to the first.
        let mut lines: Vec<OrderLine> = Vec::new();
        for line in order.lines {
            match lines.iter_mut().find(|l| l.variant_id == line.variant_id) {
                Some(existing) => existing.quantity += line.quantity,
                None => lines.push(line),
            }
        }

        let ids: Vec<String> = lines.iter().map(|l| l.variant_id.clone()).collect();
        let variants = self.records().variants().by_ids(&ids).await?;
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let variant = variants
                .iter()
                .find(|v| v.id == line.variant_id)
                .ok_or_else(|| EngineError::not_found("Variant", &line.variant_id))?;
            validate_quantity(line.quantity, variant.selling_method)?;
            let cost = line.cost.unwrap_or(variant.cost);
            validate_price("cost", cost)?;
            items.push(PurchaseOrderItem {
                variant_id: line.variant_id,
                quantity_ordered: line.quantity,
                quantity_received: Quantity::zero(),
                cost,
                tax_rate: variant.tax_rate,
            });
        }

        let (subtotal, tax, total) = purchasing::order_totals(&items);
        let now = Utc::now();
        let po = PurchaseOrder {
            id: new_id(),
            po_number: document_number("PO", now),
            date: now,
            supplier,
            expected_delivery_date: order.expected_delivery_date,
            status: purchasing::derive_status(&items),
            items,
            subtotal,
            tax,
            total,
        };

        let po = self.records().purchase_orders().insert(&po).await?;
        info!(po_number = %po.po_number, supplier = %po.supplier, total = %po.total, "Created purchase order");
        Ok(po)
    }

    // =========================================================================
    // Goods Receipts
    // =========================================================================

    /// Every line's variant exists and its selling method accepts the quantity.
    async fn check_received_quantities(&self, lines: &[StockLine]) -> EngineResult<()> {
        let ids: Vec<String> = lines.iter().map(|l| l.variant_id.clone()).collect();
        let variants = self.records().variants().by_ids(&ids).await?;
        for line in lines {
            let variant = variants
                .iter()
                .find(|v| v.id == line.variant_id)
                .ok_or_else(|| EngineError::not_found("Variant", &line.variant_id))?;
            validate_quantity(line.quantity, variant.selling_method)?;
        }
        Ok(())
    }

    /// Receives stock against an open purchase order.
    pub async fn receive_goods(&self, purchase_order_id: &str, lines: &[StockLine]) -> EngineResult<GoodsReceiptNote> {
        let po = self
            .records()
            .purchase_orders()
            .require(purchase_order_id)
            .await?;
        if po.status == PurchaseOrderStatus::Received {
            return Err(CoreError::PurchaseOrderClosed(po.po_number).into());
        }

        let lines = receivable(lines)?;
        let items = purchasing::apply_receipt(&po, &lines)?;
        let status = purchasing::derive_status(&items);
        self.check_received_quantities(&lines).await?;

        let ids: Vec<String> = lines.iter().map(|l| l.variant_id.clone()).collect();
        let names = self.variant_names(&ids).await?;
        let now = Utc::now();
        let grn = GoodsReceiptNote {
            id: new_id(),
            date: now,
            purchase_order_id: po.id.clone(),
            purchase_order_number: po.po_number.clone(),
            supplier: po.supplier.clone(),
            items: lines
                .iter()
                .map(|l| GoodsReceiptItem {
                    variant_id: l.variant_id.clone(),
                    name: names
                        .get(&l.variant_id)
                        .cloned()
                        .unwrap_or_else(|| l.variant_id.clone()),
                    quantity_received: l.quantity,
                })
                .collect(),
        };

        info!(
            grn_id = %grn.id,
            po_number = %po.po_number,
            lines = lines.len(),
            status = %status,
            "Receiving goods"
        );

        let records = self.records().clone();
        saga::detached("receive_goods", async move {
            let mut saga = Saga::start("receive_goods");

            if let Err(e) = records.goods_receipts().insert(&grn).await {
                return Err(saga.fail(e.into(), "goods receipt not saved"));
            }
            saga.commit("goods_receipt", [grn.id.clone()]);

            match stock::receive_lots(&records, &grn.id, &lines, now).await {
                Ok(lots) => saga.commit("receipt_lots", lots.into_iter().map(|l| l.id)),
                Err(e) => {
                    return Err(saga.fail(
                        e.into(),
                        format!(
                            "goods receipt {} was saved but stock was not added; add the stock and update {} manually",
                            grn.id, po.po_number
                        ),
                    ))
                }
            }

            if let Err(e) = records
                .purchase_orders()
                .record_receipt(&po.id, &items, status)
                .await
            {
                return Err(saga.fail(
                    e.into(),
                    format!(
                        "goods receipt {} was saved and stock added but {} was not updated; update its received quantities manually",
                        grn.id, po.po_number
                    ),
                ));
            }
            saga.commit("purchase_order", [po.id.clone()]);
            saga.complete();
            Ok(grn)
        })
        .await
    }

    /// Receives stock with no purchase order behind it.
    ///
    /// A shell order (status `Received`, no items, zero totals) is written
    /// first so the receipt has an order to point at.
    pub async fn receive_manual(&self, supplier: &str, lines: &[StockLine]) -> EngineResult<GoodsReceiptNote> {
        let supplier = required("supplier", supplier)?;
        let lines = receivable(lines)?;

        self.check_received_quantities(&lines).await?;
        let ids: Vec<String> = lines.iter().map(|l| l.variant_id.clone()).collect();
        let names = self.variant_names(&ids).await?;

        let now = Utc::now();
        let po = PurchaseOrder {
            id: new_id(),
            po_number: document_number("PO", now),
            date: now,
            supplier: supplier.clone(),
            expected_delivery_date: None,
            items: Vec::new(),
            status: PurchaseOrderStatus::Received,
            subtotal: Money::zero(),
            tax: Money::zero(),
            total: Money::zero(),
        };
        let grn = GoodsReceiptNote {
            id: new_id(),
            date: now,
            purchase_order_id: po.id.clone(),
            purchase_order_number: po.po_number.clone(),
            supplier,
            items: lines
                .iter()
                .map(|l| GoodsReceiptItem {
                    variant_id: l.variant_id.clone(),
                    name: names
                        .get(&l.variant_id)
                        .cloned()
                        .unwrap_or_else(|| l.variant_id.clone()),
                    quantity_received: l.quantity,
                })
                .collect(),
        };

        info!(grn_id = %grn.id, po_number = %po.po_number, lines = lines.len(), "Receiving goods without an order");

        let records = self.records().clone();
        saga::detached("receive_manual", async move {
            let mut saga = Saga::start("receive_manual");

            if let Err(e) = records.purchase_orders().insert(&po).await {
                return Err(saga.fail(e.into(), "purchase order not saved"));
            }
            saga.commit("purchase_order", [po.id.clone()]);

            if let Err(e) = records.goods_receipts().insert(&grn).await {
                return Err(saga.fail(
                    e.into(),
                    format!(
                        "{} was created but the goods receipt was not saved; no stock was added",
                        po.po_number
                    ),
                ));
            }
            saga.commit("goods_receipt", [grn.id.clone()]);

            match stock::receive_lots(&records, &grn.id, &lines, now).await {
                Ok(lots) => saga.commit("receipt_lots", lots.into_iter().map(|l| l.id)),
                Err(e) => {
                    return Err(saga.fail(
                        e.into(),
                        format!(
                            "goods receipt {} was saved but stock was not added; add the stock manually",
                            grn.id
                        ),
                    ))
                }
            }
            saga.complete();
            Ok(grn)
        })
        .await
    }

    // =========================================================================
    // Invoices
    // =========================================================================

    /// Invoices a goods receipt at the cost and tax of its purchase order.
    ///
    /// A receipt that already has an invoice is invoiced again with a warning;
    /// [`uninvoiced_receipts`](Self::uninvoiced_receipts) is what keeps that
    /// from happening in normal use.
    pub async fn invoice_receipt(&self, goods_receipt_id: &str, invoice_number: &str, due_date: NaiveDate) -> EngineResult<PurchaseInvoice> {
        let invoice_number = required("invoiceNumber", invoice_number)?;
        let grn = self
            .records()
            .goods_receipts()
            .require(goods_receipt_id)
            .await?;
        let po = self
            .records()
            .purchase_orders()
            .require(&grn.purchase_order_id)
            .await?;

        let existing = self.records().invoices().for_receipt(&grn.id).await?;
        if !existing.is_empty() {
            warn!(
                grn_id = %grn.id,
                invoices = existing.len(),
                "Goods receipt is already invoiced; invoicing again"
            );
        }

        let items = purchasing::invoice_lines(&grn, &po);
        let invoice = PurchaseInvoice {
            id: new_id(),
            invoice_number,
            date: Utc::now(),
            due_date,
            goods_receipt_id: Some(grn.id.clone()),
            supplier: grn.supplier.clone(),
            total: purchasing::invoice_total(&items),
            items,
            status: InvoiceStatus::Unpaid,
        };
        let invoice = self.records().invoices().insert(&invoice).await?;
        info!(invoice_number = %invoice.invoice_number, grn_id = %grn.id, total = %invoice.total, "Invoiced goods receipt");
        Ok(invoice)
    }

    pub async fn create_invoice(&self, new: NewInvoice) -> EngineResult<PurchaseInvoice> {
        let invoice_number = required("invoiceNumber", &new.invoice_number)?;
        let supplier = required("supplier", &new.supplier)?;
        if new.items.is_empty() {
            return Err(ValidationError::required("items").into());
        }
        for item in &new.items {
            required("description", &item.description)?;
            validate_price("amount", item.amount)?;
        }

        let invoice = PurchaseInvoice {
            id: new_id(),
            invoice_number,
            date: Utc::now(),
            due_date: new.due_date,
            goods_receipt_id: None,
            supplier,
            total: purchasing::invoice_total(&new.items),
            items: new.items,
            status: InvoiceStatus::Unpaid,
        };
        let invoice = self.records().invoices().insert(&invoice).await?;
        info!(invoice_number = %invoice.invoice_number, total = %invoice.total, "Created invoice");
        Ok(invoice)
    }

    /// Unpaid → Paid. Paying twice is rejected.
    pub async fn mark_invoice_paid(&self, invoice_id: &str) -> EngineResult<PurchaseInvoice> {
        let mut invoice = self.records().invoices().require(invoice_id).await?;
        if invoice.status == InvoiceStatus::Paid {
            return Err(CoreError::InvoiceAlreadyPaid(invoice.invoice_number).into());
        }
        self.records().invoices().mark_paid(&invoice.id).await?;
        info!(invoice_number = %invoice.invoice_number, "Invoice paid");
        invoice.status = InvoiceStatus::Paid;
        Ok(invoice)
    }

    /// Goods receipts with no invoice yet, oldest first.
    pub async fn uninvoiced_receipts(&self) -> EngineResult<Vec<GoodsReceiptNote>> {
        let invoiced: HashSet<String> = self
            .records()
            .invoices()
            .all()
            .await?
            .into_iter()
            .filter_map(|i| i.goods_receipt_id)
            .collect();
        let mut receipts: Vec<GoodsReceiptNote> = self
            .records()
            .goods_receipts()
            .all()
            .await?
            .into_iter()
            .filter(|g| !invoiced.contains(&g.id))
            .collect();
        receipts.sort_by_key(|g| g.date);
        Ok(receipts)
    }
}
