//! # Reports
//!
//! Sales and inventory rollups computed from transactions and the lot ledger.
//! Void transactions never count. Returns carry negative totals, so summing
//! signed amounts yields net figures directly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::ledger::ProductLedger;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{PaymentMethod, PaymentTender, Transaction, TransactionKind, TransactionStatus};

fn counted(transactions: &[Transaction]) -> impl Iterator<Item = &Transaction> {
    transactions
        .iter()
        .filter(|t| t.status == TransactionStatus::Completed)
}

// =============================================================================
// Sales Summary
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SalesSummary {
    pub sale_count: usize,
    pub return_count: usize,
    pub void_count: usize,
    /// Σ total of completed sales.
    pub gross_sales: Money,
    /// Σ |total| of completed returns.
    pub returns: Money,
    pub net_sales: Money,
    /// Net tax (sales tax minus refunded tax).
    pub tax_collected: Money,
}

pub fn summarize(transactions: &[Transaction]) -> SalesSummary {
    let mut summary = SalesSummary {
        void_count: transactions
            .iter()
            .filter(|t| t.status == TransactionStatus::Void)
            .count(),
        ..SalesSummary::default()
    };

    for tx in counted(transactions) {
        match tx.kind {
            TransactionKind::Sale => {
                summary.sale_count += 1;
                summary.gross_sales += tx.total;
            }
            TransactionKind::Return => {
                summary.return_count += 1;
                summary.returns += tx.total.abs();
            }
        }
        summary.tax_collected += tx.tax;
    }
    summary.net_sales = summary.gross_sales - summary.returns;
    summary
}

// =============================================================================
// Breakdowns
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub transactions: usize,
    pub net_sales: Money,
}

/// Net sales per calendar day (UTC), oldest first.
pub fn daily_totals(transactions: &[Transaction]) -> Vec<DailyTotal> {
    let mut days: BTreeMap<NaiveDate, DailyTotal> = BTreeMap::new();
    for tx in counted(transactions) {
        let date = tx.date.date_naive();
        let day = days.entry(date).or_insert(DailyTotal {
            date,
            transactions: 0,
            net_sales: Money::zero(),
        });
        day.transactions += 1;
        day.net_sales += tx.total;
    }
    days.into_values().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TopSeller {
    pub variant_id: String,
    pub sku: String,
    pub name: String,
    /// Sold minus returned.
    pub quantity: Quantity,
    /// Net revenue before tax.
    pub revenue: Money,
}

/// Variants ranked by net quantity sold, highest first; ties broken by SKU.
pub fn top_sellers(transactions: &[Transaction], limit: usize) -> Vec<TopSeller> {
    let mut by_variant: BTreeMap<String, TopSeller> = BTreeMap::new();
    for tx in counted(transactions) {
        let sign = match tx.kind {
            TransactionKind::Sale => 1,
            TransactionKind::Return => -1,
        };
        for item in &tx.items {
            let entry = by_variant
                .entry(item.variant_id.clone())
                .or_insert_with(|| TopSeller {
                    variant_id: item.variant_id.clone(),
                    sku: item.sku.clone(),
                    name: item.name.clone(),
                    quantity: Quantity::zero(),
                    revenue: Money::zero(),
                });
            if sign > 0 {
                entry.quantity += item.quantity;
                entry.revenue += item.line_total();
            } else {
                entry.quantity = entry.quantity - item.quantity;
                entry.revenue -= item.line_total();
            }
        }
    }

    let mut ranked: Vec<TopSeller> = by_variant
        .into_values()
        .filter(|t| t.quantity.is_positive())
        .collect();
    ranked.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.sku.cmp(&b.sku)));
    ranked.truncate(limit);
    ranked
}

/// Net amount taken per payment method (refunds are negative tenders).
pub fn payment_breakdown(transactions: &[Transaction]) -> Vec<PaymentTender> {
    let mut by_method: Vec<PaymentTender> = Vec::new();
    for tender in counted(transactions).flat_map(|t| t.payment_methods.iter()) {
        match by_method.iter_mut().find(|t| t.method == tender.method) {
            Some(existing) => existing.amount += tender.amount,
            None => by_method.push(tender.clone()),
        }
    }
    let order = |m: &PaymentMethod| match m {
        PaymentMethod::Cash => 0,
        PaymentMethod::Card => 1,
        PaymentMethod::MobileMoney => 2,
    };
    by_method.sort_by_key(|t| order(&t.method));
    by_method
}

/// Stock on hand valued at cost. Negative stock counts as zero.
pub fn inventory_valuation(ledgers: &[ProductLedger]) -> Money {
    ledgers
        .iter()
        .flat_map(|p| p.variants.iter())
        .filter(|v| v.stock().is_positive())
        .map(|v| v.valuation())
        .sum()
}

/// Complete report for a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SalesReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub summary: SalesSummary,
    pub daily: Vec<DailyTotal>,
    pub top_sellers: Vec<TopSeller>,
    pub payments: Vec<PaymentTender>,
}

impl SalesReport {
    /// Builds a report from transactions already filtered to `from..=to`.
    pub fn build(from: NaiveDate, to: NaiveDate, transactions: &[Transaction], top: usize) -> SalesReport {
        SalesReport {
            from,
            to,
            summary: summarize(transactions),
            daily: daily_totals(transactions),
            top_sellers: top_sellers(transactions, top),
            payments: payment_breakdown(transactions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::Totals;
    use crate::quantity::SellingMethod;
    use crate::types::{CartItem, TaxRate};
    use chrono::{TimeZone, Utc};

    fn item(variant_id: &str, units: i64) -> CartItem {
        CartItem {
            variant_id: variant_id.to_string(),
            product_id: "p1".to_string(),
            name: format!("Item {}", variant_id),
            sku: format!("SKU-{}", variant_id),
            price: Money::from_cents(1000),
            tax_rate: TaxRate::from_bps(1000),
            quantity: Quantity::from_units(units),
            selling_method: SellingMethod::Each,
        }
    }

    fn tx(id: &str, day: u32, kind: TransactionKind, status: TransactionStatus, items: Vec<CartItem>) -> Transaction {
        let mut totals = Totals::of(&items);
        if kind == TransactionKind::Return {
            totals = totals.negated();
        }
        Transaction {
            id: id.to_string(),
            date: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
            items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            amount_paid: totals.total,
            customer: None,
            payment_methods: vec![PaymentTender {
                method: PaymentMethod::Cash,
                amount: totals.total,
            }],
            status,
            kind,
            user: "u1".to_string(),
            original_transaction_id: None,
        }
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx("s1", 1, TransactionKind::Sale, TransactionStatus::Completed, vec![item("a", 3), item("b", 1)]),
            tx("s2", 2, TransactionKind::Sale, TransactionStatus::Completed, vec![item("b", 4)]),
            tx("s3", 2, TransactionKind::Sale, TransactionStatus::Void, vec![item("a", 9)]),
            tx("r1", 2, TransactionKind::Return, TransactionStatus::Completed, vec![item("a", 2)]),
        ]
    }

    #[test]
    fn test_summary_excludes_void() {
        let s = summarize(&sample());
        assert_eq!(s.sale_count, 2);
        assert_eq!(s.return_count, 1);
        assert_eq!(s.void_count, 1);
        assert_eq!(s.gross_sales.cents(), 8800);
        assert_eq!(s.returns.cents(), 2200);
        assert_eq!(s.net_sales.cents(), 6600);
        assert_eq!(s.tax_collected.cents(), 600);
    }

    #[test]
    fn test_daily_totals() {
        let days = daily_totals(&sample());
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].net_sales.cents(), 4400);
        assert_eq!(days[1].transactions, 2);
        assert_eq!(days[1].net_sales.cents(), 2200);
    }

    #[test]
    fn test_top_sellers_net_of_returns() {
        let top = top_sellers(&sample(), 10);
        assert_eq!(top[0].variant_id, "b");
        assert_eq!(top[0].quantity, Quantity::from_units(5));
        assert_eq!(top[1].variant_id, "a");
        assert_eq!(top[1].quantity, Quantity::from_units(1));
        assert_eq!(top[1].revenue.cents(), 1000);
        assert_eq!(top_sellers(&sample(), 1).len(), 1);
    }

    #[test]
    fn test_payment_breakdown_nets_refunds() {
        let payments = payment_breakdown(&sample());
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount.cents(), 6600);
    }
}
