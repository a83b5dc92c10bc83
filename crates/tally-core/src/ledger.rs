//! # Stock Ledger
//!
//! Stock is derived, never stored.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Lots for variant TEE-RED-M                                            │
//! │                                                                         │
//! │   GRN-4f1c…   +10   (goods receipt)                                    │
//! │   SALE-9a2e…   -3   (sale)                                             │
//! │   RET-77b0…    +2   (return)                                           │
//! │                ───                                                      │
//! │   stock          9  = Σ lot.quantity                                   │
//! │                                                                         │
//! │  stock(product) = Σ stock(variant)                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The lot constructors below are the only way business events become ledger
//! rows, so every event type produces lots with a recognisable lot number.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use ts_rs::TS;

use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{new_id, Lot, Product, Variant};

/// Sums signed lot quantities.
pub fn stock_of(lots: &[Lot]) -> Quantity {
    lots.iter().map(|lot| lot.quantity).sum()
}

// =============================================================================
// Aggregates
// =============================================================================

/// A variant together with its lots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VariantLedger {
    pub variant: Variant,
    pub lots: Vec<Lot>,
}

impl VariantLedger {
    pub fn stock(&self) -> Quantity {
        stock_of(&self.lots)
    }

    pub fn level(&self) -> StockLevel {
        StockLevel::classify(self.stock(), self.variant.reorder_point)
    }

    /// Stock valued at cost.
    pub fn valuation(&self) -> Money {
        self.variant.cost.times(self.stock())
    }
}

/// A product together with its variants and their lots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProductLedger {
    pub product: Product,
    pub variants: Vec<VariantLedger>,
}

impl ProductLedger {
    pub fn stock(&self) -> Quantity {
        self.variants.iter().map(VariantLedger::stock).sum()
    }

    pub fn variant(&self, variant_id: &str) -> Option<&VariantLedger> {
        self.variants.iter().find(|v| v.variant.id == variant_id)
    }
}

/// Builds the ownership tree from flat record lists.
///
/// Variants whose product is missing and lots whose variant is missing are
/// dropped. Output order follows the input order of products and variants.
pub fn assemble(products: Vec<Product>, variants: Vec<Variant>, lots: Vec<Lot>) -> Vec<ProductLedger> {
    let mut lots_by_variant: HashMap<String, Vec<Lot>> = HashMap::new();
    for lot in lots {
        lots_by_variant
            .entry(lot.variant_id.clone())
            .or_default()
            .push(lot);
    }

    let mut variants_by_product: HashMap<String, Vec<VariantLedger>> = HashMap::new();
    for variant in variants {
        let lots = lots_by_variant.remove(&variant.id).unwrap_or_default();
        variants_by_product
            .entry(variant.product_id.clone())
            .or_default()
            .push(VariantLedger { variant, lots });
    }

    products
        .into_iter()
        .map(|product| {
            let variants = variants_by_product.remove(&product.id).unwrap_or_default();
            ProductLedger { product, variants }
        })
        .collect()
}

// =============================================================================
// Stock Level
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum StockLevel {
    InStock,
    /// `0 < stock ≤ reorder point`
    Low,
    /// `stock ≤ 0`
    Out,
}

impl StockLevel {
    pub fn classify(stock: Quantity, reorder_point: Quantity) -> StockLevel {
        if !stock.is_positive() {
            StockLevel::Out
        } else if stock <= reorder_point {
            StockLevel::Low
        } else {
            StockLevel::InStock
        }
    }
}

// =============================================================================
// Stock Lines & Lot Construction
// =============================================================================

/// A `(variant, quantity)` pair handed to the stock engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StockLine {
    pub variant_id: String,
    pub quantity: Quantity,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

impl StockLine {
    pub fn new(variant_id: impl Into<String>, quantity: Quantity) -> Self {
        StockLine {
            variant_id: variant_id.into(),
            quantity,
            expiry_date: None,
        }
    }
}

/// Collapses lines to one per variant, summing quantities.
///
/// Keeps first-seen order and the first non-empty expiry date.
pub fn merge_lines(lines: &[StockLine]) -> Vec<StockLine> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: BTreeMap<String, StockLine> = BTreeMap::new();
    for line in lines {
        match merged.get_mut(&line.variant_id) {
            Some(existing) => {
                existing.quantity += line.quantity;
                if existing.expiry_date.is_none() {
                    existing.expiry_date = line.expiry_date;
                }
            }
            None => {
                order.push(line.variant_id.clone());
                merged.insert(line.variant_id.clone(), line.clone());
            }
        }
    }
    order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .collect()
}

/// Drops zero and negative lines, then merges the rest per variant.
///
/// A negative line never nets against a positive one.
pub fn merge_positive(lines: &[StockLine]) -> Vec<StockLine> {
    let positive: Vec<StockLine> = lines
        .iter()
        .filter(|l| l.quantity.is_positive())
        .cloned()
        .collect();
    merge_lines(&positive)
}

fn lot(variant_id: &str, lot_number: String, quantity: Quantity, expiry: Option<NaiveDate>, at: DateTime<Utc>) -> Lot {
    Lot {
        id: new_id(),
        variant_id: variant_id.to_string(),
        lot_number,
        expiry_date: expiry,
        quantity,
        created_at: at,
    }
}

/// Negative lot for a sold line. `quantity` is the positive sold amount.
pub fn sale_lot(transaction_id: &str, line: &StockLine, at: DateTime<Utc>) -> Lot {
    lot(
        &line.variant_id,
        format!("SALE-{}", transaction_id),
        -line.quantity,
        None,
        at,
    )
}

/// Positive lot for a returned line.
pub fn return_lot(return_transaction_id: &str, line: &StockLine, at: DateTime<Utc>) -> Lot {
    lot(
        &line.variant_id,
        format!("RET-{}", return_transaction_id),
        line.quantity,
        None,
        at,
    )
}

/// Positive lot for a received line, tagged with the goods receipt id.
pub fn receipt_lot(goods_receipt_id: &str, line: &StockLine, at: DateTime<Utc>) -> Lot {
    lot(
        &line.variant_id,
        format!("GRN-{}", goods_receipt_id),
        line.quantity,
        line.expiry_date,
        at,
    )
}

/// The single lot that replaces every lot of a variant after an adjustment.
pub fn adjustment_lot(variant_id: &str, new_stock: Quantity, at: DateTime<Utc>) -> Lot {
    lot(
        variant_id,
        format!("ADJ-{}", at.format("%Y%m%d%H%M%S")),
        new_stock,
        None,
        at,
    )
}

/// Opening-stock lot for a newly created or imported variant.
pub fn opening_lot(variant_id: &str, lot_number: Option<&str>, quantity: Quantity, expiry: Option<NaiveDate>, at: DateTime<Utc>) -> Lot {
    let lot_number = match lot_number.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => format!("OPEN-{}", at.format("%Y%m%d")),
    };
    lot(variant_id, lot_number, quantity, expiry, at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::SellingMethod;
    use crate::types::TaxRate;

    fn product(id: &str) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            category: "Apparel".to_string(),
            brand: "Acme".to_string(),
            image_url: None,
            created_at: Utc::now(),
        }
    }

    fn variant(id: &str, product_id: &str, reorder: i64) -> Variant {
        Variant {
            id: id.to_string(),
            product_id: product_id.to_string(),
            attributes: BTreeMap::new(),
            sku: format!("SKU-{}", id),
            barcode: None,
            price: Money::from_cents(1000),
            cost: Money::from_cents(400),
            tax_rate: TaxRate::from_bps(1600),
            reorder_point: Quantity::from_units(reorder),
            selling_method: SellingMethod::Each,
            storage_uom: "pcs".to_string(),
        }
    }

    fn lot_of(variant_id: &str, units: i64) -> Lot {
        lot(variant_id, "L".to_string(), Quantity::from_units(units), None, Utc::now())
    }

    #[test]
    fn test_stock_is_sum_of_lots() {
        let lots = vec![lot_of("v1", 10), lot_of("v1", -3), lot_of("v1", 2)];
        assert_eq!(stock_of(&lots), Quantity::from_units(9));
        assert_eq!(stock_of(&[]), Quantity::zero());
    }

    #[test]
    fn test_assemble_and_product_stock() {
        let ledgers = assemble(
            vec![product("p1"), product("p2")],
            vec![variant("v1", "p1", 5), variant("v2", "p1", 5), variant("v3", "p2", 5), variant("orphan", "gone", 5)],
            vec![lot_of("v1", 4), lot_of("v2", 6), lot_of("v2", -1), lot_of("v3", 1), lot_of("missing", 99)],
        );

        assert_eq!(ledgers.len(), 2);
        let p1 = &ledgers[0];
        assert_eq!(p1.variants.len(), 2);
        assert_eq!(p1.stock(), Quantity::from_units(9));
        let per_variant: Quantity = p1.variants.iter().map(VariantLedger::stock).sum();
        assert_eq!(p1.stock(), per_variant);
        assert_eq!(ledgers[1].stock(), Quantity::from_units(1));
    }

    #[test]
    fn test_aggregation_is_repeatable() {
        let build = || {
            assemble(
                vec![product("p1")],
                vec![variant("v1", "p1", 5)],
                vec![lot_of("v1", 7), lot_of("v1", -2)],
            )
        };
        let first = build();
        assert_eq!(first[0].stock(), first[0].stock());
        assert_eq!(first[0].stock(), Quantity::from_units(5));
    }

    #[test]
    fn test_stock_level_classification() {
        let reorder = Quantity::from_units(5);
        assert_eq!(StockLevel::classify(Quantity::from_units(2), reorder), StockLevel::Low);
        assert_eq!(StockLevel::classify(Quantity::from_units(5), reorder), StockLevel::Low);
        assert_eq!(StockLevel::classify(Quantity::from_units(6), reorder), StockLevel::InStock);
        assert_eq!(StockLevel::classify(Quantity::zero(), reorder), StockLevel::Out);
        assert_eq!(StockLevel::classify(Quantity::from_units(-1), reorder), StockLevel::Out);
    }

    #[test]
    fn test_merge_lines_one_per_variant() {
        let lines = vec![
            StockLine::new("v1", Quantity::from_units(2)),
            StockLine::new("v2", Quantity::from_units(1)),
            StockLine::new("v1", Quantity::from_units(3)),
        ];
        let merged = merge_lines(&lines);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].variant_id, "v1");
        assert_eq!(merged[0].quantity, Quantity::from_units(5));
        assert_eq!(merged[1].variant_id, "v2");
    }

    #[test]
    fn test_merge_positive_ignores_negative_lines() {
        let lines = vec![
            StockLine::new("v1", Quantity::from_units(5)),
            StockLine::new("v1", Quantity::from_units(-3)),
            StockLine::new("v2", Quantity::zero()),
        ];
        let merged = merge_positive(&lines);
        assert_eq!(merged, vec![StockLine::new("v1", Quantity::from_units(5))]);
    }

    #[test]
    fn test_lot_signs_and_numbers() {
        let now = Utc::now();
        let line = StockLine::new("v1", Quantity::from_units(3));

        let sold = sale_lot("tx-1", &line, now);
        assert_eq!(sold.quantity, Quantity::from_units(-3));
        assert_eq!(sold.lot_number, "SALE-tx-1");

        let returned = return_lot("tx-2", &line, now);
        assert_eq!(returned.quantity, Quantity::from_units(3));
        assert_eq!(returned.lot_number, "RET-tx-2");

        let received = receipt_lot("grn-1", &line, now);
        assert_eq!(received.lot_number, "GRN-grn-1");
        assert!(received.quantity.is_positive());

        let adjusted = adjustment_lot("v1", Quantity::from_units(12), now);
        assert!(adjusted.lot_number.starts_with("ADJ-"));
        assert_eq!(adjusted.quantity, Quantity::from_units(12));

        let opening = opening_lot("v1", Some("  "), Quantity::from_units(1), None, now);
        assert!(opening.lot_number.starts_with("OPEN-"));
        let opening = opening_lot("v1", Some("B-22"), Quantity::from_units(1), None, now);
        assert_eq!(opening.lot_number, "B-22");
    }

    #[test]
    fn test_valuation_at_cost() {
        let ledger = VariantLedger {
            variant: variant("v1", "p1", 5),
            lots: vec![lot_of("v1", 3)],
        };
        assert_eq!(ledger.valuation().cents(), 1200);
        assert_eq!(ledger.level(), StockLevel::Low);
    }
}
