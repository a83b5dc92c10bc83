//! # Cart
//!
//! The till's cart and the totals math shared by sales and returns.
//!
//! ## Cart Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  Scan / pick variant ────► add_item() ─────────► merge by variant id   │
//! │                                                                         │
//! │  Change quantity ────────► update_quantity() ──► 0 removes the line    │
//! │                                                                         │
//! │  Remove ─────────────────► remove_item()                               │
//! │                                                                         │
//! │  Payment settled ────────► totals() ───────────► Transaction fields    │
//! │                                                                         │
//! │  Prices and tax rates are frozen on the line when it is added.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::ledger::StockLine;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{CartItem, Transaction, TransactionKind, TransactionStatus, Variant};
use crate::validation::validate_quantity;
use crate::MAX_CART_ITEMS;

// =============================================================================
// Totals
// =============================================================================

/// Subtotal, tax and total of a set of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

impl Totals {
    /// `subtotal = Σ price × qty`, `tax = Σ price × qty × rate`, `total = subtotal + tax`.
    ///
    /// Tax is rounded per line, then summed.
    pub fn of(items: &[CartItem]) -> Totals {
        let subtotal: Money = items.iter().map(CartItem::line_total).sum();
        let tax: Money = items.iter().map(CartItem::tax).sum();
        Totals {
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }

    /// Same totals with every field negated, as stored on a return.
    pub fn negated(self) -> Totals {
        Totals {
            subtotal: -self.subtotal,
            tax: -self.tax,
            total: -self.total,
        }
    }
}

// =============================================================================
// Cart
// =============================================================================

/// The shopping cart.
///
/// ## Invariants
/// - At most one line per variant (adding again increases quantity)
/// - Every line quantity is positive and acceptable for its selling method
/// - At most [`MAX_CART_ITEMS`] lines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    pub fn new() -> Self {
        Cart {
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds a variant, or increases the quantity of its existing line.
    pub fn add_item(&mut self, product_name: &str, variant: &Variant, quantity: Quantity) -> CoreResult<()> {
        validate_quantity(quantity, variant.selling_method)?;

        if let Some(item) = self.items.iter_mut().find(|i| i.variant_id == variant.id) {
            let new_qty = item.quantity + quantity;
            validate_quantity(new_qty, item.selling_method)?;
            item.quantity = new_qty;
            return Ok(());
        }

        if self.items.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS });
        }

        self.items
            .push(CartItem::from_variant(product_name, variant, quantity));
        Ok(())
    }

    /// Sets the quantity of a line. Zero removes the line.
    pub fn update_quantity(&mut self, variant_id: &str, quantity: Quantity) -> CoreResult<()> {
        if quantity.is_zero() {
            return self.remove_item(variant_id);
        }

        let item = self
            .items
            .iter_mut()
            .find(|i| i.variant_id == variant_id)
            .ok_or_else(|| CoreError::NotInCart(variant_id.to_string()))?;
        validate_quantity(quantity, item.selling_method)?;
        item.quantity = quantity;
        Ok(())
    }

    pub fn remove_item(&mut self, variant_id: &str) -> CoreResult<()> {
        let initial_len = self.items.len();
        self.items.retain(|i| i.variant_id != variant_id);

        if self.items.len() == initial_len {
            Err(CoreError::NotInCart(variant_id.to_string()))
        } else {
            Ok(())
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.created_at = Utc::now();
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn totals(&self) -> Totals {
        Totals::of(&self.items)
    }

    /// One stock line per variant, for the sale's negative lots.
    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.items
            .iter()
            .map(|i| StockLine::new(i.variant_id.clone(), i.quantity))
            .collect()
    }
}

/// Cart summary for display.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartTotals {
    pub item_count: usize,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

impl From<&Cart> for CartTotals {
    fn from(cart: &Cart) -> Self {
        let totals = cart.totals();
        CartTotals {
            item_count: cart.item_count(),
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
        }
    }
}

// =============================================================================
// Returns
// =============================================================================

/// Builds the (positive-quantity) lines of a return against `original`.
///
/// `prior_returns` are earlier Return transactions against the same sale;
/// their quantities count as already returned. Lines with a non-positive
/// quantity are dropped before the rest are merged per variant. Prices and
/// tax rates come from the original sale line, not the current variant.
pub fn build_return(original: &Transaction, prior_returns: &[Transaction], lines: &[StockLine]) -> CoreResult<Vec<CartItem>> {
    if original.kind != TransactionKind::Sale {
        return Err(CoreError::NotReturnable {
            transaction_id: original.id.clone(),
            reason: "only sales can be returned".to_string(),
        });
    }
    if original.status != TransactionStatus::Completed {
        return Err(CoreError::NotReturnable {
            transaction_id: original.id.clone(),
            reason: "the sale was voided".to_string(),
        });
    }

    let mut items = Vec::new();
    for line in crate::ledger::merge_positive(lines) {
        let sold_lines: Vec<&CartItem> = original
            .items
            .iter()
            .filter(|i| i.variant_id == line.variant_id)
            .collect();
        let Some(template) = sold_lines.first() else {
            return Err(CoreError::NotOnTransaction {
                transaction_id: original.id.clone(),
                variant_id: line.variant_id.clone(),
            });
        };

        let sold: Quantity = sold_lines.iter().map(|i| i.quantity).sum();
        let already_returned: Quantity = prior_returns
            .iter()
            .filter(|r| r.status == TransactionStatus::Completed)
            .flat_map(|r| r.items.iter())
            .filter(|i| i.variant_id == line.variant_id)
            .map(|i| i.quantity)
            .sum();
        let returnable = sold - already_returned;

        if line.quantity > returnable {
            return Err(CoreError::ReturnExceedsSold {
                sku: template.sku.clone(),
                sold: returnable,
                requested: line.quantity,
            });
        }
        if !template.selling_method.accepts(line.quantity) {
            return Err(crate::error::ValidationError::invalid(
                "quantity",
                format!("{} is not a whole number of units", line.quantity),
            )
            .into());
        }

        let mut item = (*template).clone();
        item.quantity = line.quantity;
        items.push(item);
    }

    if items.is_empty() {
        return Err(CoreError::EmptyCart);
    }
    Ok(items)
}
