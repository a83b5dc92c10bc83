//! # Purchasing Rules
//!
//! Purchase order status derivation, receipt application and invoice
//! derivation from goods receipts.
//!
//! ## Purchase Order State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Ordered ──receipt──► Partially Received ──receipt──► Received        │
//! │      │                                                    ▲             │
//! │      └───────────────receipt covering everything──────────┘             │
//! │                                                                         │
//! │   Status is never stored independently of the items: it is recomputed  │
//! │   from quantityReceived vs quantityOrdered whenever items change.       │
//! │   quantityReceived only grows, so the status never moves backwards.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult};
use crate::ledger::StockLine;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{GoodsReceiptNote, InvoiceLine, PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus};

/// Status as a pure function of the items.
///
/// `Received` iff every item has received ≥ ordered (so an order with no items
/// is `Received`), else `Partially Received` if anything arrived, else `Ordered`.
pub fn derive_status(items: &[PurchaseOrderItem]) -> PurchaseOrderStatus {
    if items.iter().all(|i| i.quantity_received >= i.quantity_ordered) {
        PurchaseOrderStatus::Received
    } else if items.iter().any(|i| i.quantity_received.is_positive()) {
        PurchaseOrderStatus::PartiallyReceived
    } else {
        PurchaseOrderStatus::Ordered
    }
}

/// Subtotal, tax and total of an order at cost.
pub fn order_totals(items: &[PurchaseOrderItem]) -> (Money, Money, Money) {
    let subtotal: Money = items.iter().map(|i| i.cost.times(i.quantity_ordered)).sum();
    let tax: Money = items
        .iter()
        .map(|i| i.cost.times(i.quantity_ordered).calculate_tax(i.tax_rate))
        .sum();
    (subtotal, tax, subtotal + tax)
}

/// Adds newly received quantities to the order lines.
///
/// Lines with a non-positive quantity are ignored. When a variant appears on
/// more than one order line, the receipt fills the first line with something
/// outstanding; any excess lands on the last matching line.
pub fn apply_receipt(order: &PurchaseOrder, lines: &[StockLine]) -> CoreResult<Vec<PurchaseOrderItem>> {
    let mut items = order.items.clone();
    for line in lines.iter().filter(|l| l.quantity.is_positive()) {
        let matching: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.variant_id == line.variant_id)
            .map(|(idx, _)| idx)
            .collect();
        let Some(&last) = matching.last() else {
            return Err(CoreError::NotOnPurchaseOrder {
                po_number: order.po_number.clone(),
                variant_id: line.variant_id.clone(),
            });
        };

        let mut remaining = line.quantity;
        for &idx in &matching {
            if !remaining.is_positive() {
                break;
            }
            let take = items[idx].outstanding().min(remaining);
            items[idx].quantity_received += take;
            remaining = remaining - take;
        }
        if remaining.is_positive() {
            items[last].quantity_received += remaining;
        }
    }
    Ok(items)
}

/// Invoice lines for a goods receipt, priced from the originating order.
///
/// `amount = quantityReceived × cost × (1 + taxRate)`. Receipt items with no
/// matching order line (manual receipts) are priced at zero.
pub fn invoice_lines(receipt: &GoodsReceiptNote, order: &PurchaseOrder) -> Vec<InvoiceLine> {
    receipt
        .items
        .iter()
        .map(|item| {
            let amount = order
                .items
                .iter()
                .find(|po_item| po_item.variant_id == item.variant_id)
                .map(|po_item| po_item.cost.times(item.quantity_received).with_tax(po_item.tax_rate))
                .unwrap_or_default();
            InvoiceLine {
                description: format!("{} x {}", item.name, item.quantity_received),
                amount,
            }
        })
        .collect()
}

pub fn invoice_total(lines: &[InvoiceLine]) -> Money {
    lines.iter().map(|l| l.amount).sum()
}

/// Sum of received quantities on a goods receipt.
pub fn received_units(receipt: &GoodsReceiptNote) -> Quantity {
    receipt.items.iter().map(|i| i.quantity_received).sum()
}
