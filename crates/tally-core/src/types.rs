//! # Domain Types
//!
//! Records persisted in the record store, in their camelCase in-core form.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Product 1──* Variant 1──* Lot          (stock = Σ lot.quantity)       │
//! │                                                                         │
//! │  PurchaseOrder 1──* GoodsReceiptNote 1──0..1 PurchaseInvoice            │
//! │                                                                         │
//! │  Transaction (Sale) 1──* Transaction (Return)                           │
//! │                                                                         │
//! │  Variant 1──* StockAdjustmentLog, Notification                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these types carry a stock figure. Stock is aggregated from lots in
//! [`crate::ledger`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::{parse_fixed, Money};
use crate::quantity::{Quantity, SellingMethod};

/// Generates a new record id (UUID v4).
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points: 1600 bps = 16%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Parses a fraction such as `"0.16"` (16%) as used by the import format.
    pub fn parse_fraction(input: &str) -> Result<TaxRate, ValidationError> {
        let bps = parse_fixed(input, 4)
            .filter(|v| *v >= 0)
            .ok_or_else(|| {
                ValidationError::invalid("taxRate", format!("'{}' is not a fraction", input.trim()))
            })?;
        u32::try_from(bps)
            .map(TaxRate)
            .map_err(|_| ValidationError::invalid("taxRate", "out of range"))
    }
}

impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// One signed stock-affecting event for a variant.
///
/// Immutable once written. Only the destructive stock adjustment deletes lots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Lot {
    pub id: String,
    pub variant_id: String,
    pub lot_number: String,
    pub expiry_date: Option<NaiveDate>,
    /// Positive for received/adjusted-in, negative for sold/adjusted-out.
    pub quantity: Quantity,
    pub created_at: DateTime<Utc>,
}

/// A product as stored, without its variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: String,
    pub brand: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A sellable configuration of a product (size, colour, pack).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Variant {
    pub id: String,
    /// Owning product. Never changes after creation.
    pub product_id: String,
    /// Free-form attribute name → value (e.g. "Size" → "M").
    pub attributes: BTreeMap<String, String>,
    /// Globally unique across all products.
    pub sku: String,
    pub barcode: Option<String>,
    pub price: Money,
    pub cost: Money,
    pub tax_rate: TaxRate,
    pub reorder_point: Quantity,
    pub selling_method: SellingMethod,
    pub storage_uom: String,
}

impl Variant {
    /// "Red / M" style label built from attribute values.
    pub fn attribute_label(&self) -> String {
        self.attributes
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

// =============================================================================
// Customers & Transactions
// =============================================================================

/// A customer, resolved by phone number at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub phone: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Customer snapshot frozen onto a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CustomerRef {
    pub id: String,
    pub phone: String,
    pub name: Option<String>,
}

impl From<&Customer> for CustomerRef {
    fn from(c: &Customer) -> Self {
        CustomerRef {
            id: c.id.clone(),
            phone: c.phone.clone(),
            name: c.name.clone(),
        }
    }
}

/// A cart line, frozen onto the transaction at the time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartItem {
    pub variant_id: String,
    pub product_id: String,
    pub name: String,
    pub sku: String,
    pub price: Money,
    pub tax_rate: TaxRate,
    pub quantity: Quantity,
    pub selling_method: SellingMethod,
}

impl CartItem {
    /// Freezes a variant's price and tax rate into a cart line.
    pub fn from_variant(product_name: &str, variant: &Variant, quantity: Quantity) -> Self {
        let label = variant.attribute_label();
        let name = if label.is_empty() {
            product_name.to_string()
        } else {
            format!("{} ({})", product_name, label)
        };
        CartItem {
            variant_id: variant.id.clone(),
            product_id: variant.product_id.clone(),
            name,
            sku: variant.sku.clone(),
            price: variant.price,
            tax_rate: variant.tax_rate,
            quantity,
            selling_method: variant.selling_method,
        }
    }

    /// price × quantity.
    pub fn line_total(&self) -> Money {
        self.price.times(self.quantity)
    }

    /// price × quantity × taxRate.
    pub fn tax(&self) -> Money {
        self.line_total().calculate_tax(self.tax_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "Cash"),
            PaymentMethod::Card => write!(f, "Card"),
            PaymentMethod::MobileMoney => write!(f, "Mobile Money"),
        }
    }
}

/// One tender applied to a transaction (split payments have several).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PaymentTender {
    pub method: PaymentMethod,
    pub amount: Money,
}

/// Completed → Void is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum TransactionStatus {
    Completed,
    /// Set by the compensating write when stock could not be recorded.
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum TransactionKind {
    Sale,
    /// Monetary fields are negated by convention.
    Return,
}

/// A sale or return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    pub date: DateTime<Utc>,
    pub items: Vec<CartItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub amount_paid: Money,
    pub customer: Option<CustomerRef>,
    pub payment_methods: Vec<PaymentTender>,
    pub status: TransactionStatus,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Id of the user who rang up the transaction.
    pub user: String,
    /// For returns: the sale being returned against.
    #[serde(default)]
    pub original_transaction_id: Option<String>,
}

// =============================================================================
// Purchasing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum PurchaseOrderStatus {
    Ordered,
    #[serde(rename = "Partially Received")]
    PartiallyReceived,
    Received,
}

impl fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurchaseOrderStatus::Ordered => write!(f, "Ordered"),
            PurchaseOrderStatus::PartiallyReceived => write!(f, "Partially Received"),
            PurchaseOrderStatus::Received => write!(f, "Received"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PurchaseOrderItem {
    pub variant_id: String,
    pub quantity_ordered: Quantity,
    /// Only ever increased, by goods-receipt processing.
    pub quantity_received: Quantity,
    pub cost: Money,
    pub tax_rate: TaxRate,
}

impl PurchaseOrderItem {
    /// Quantity still expected from the supplier (never negative).
    pub fn outstanding(&self) -> Quantity {
        let remaining = self.quantity_ordered - self.quantity_received;
        if remaining.is_positive() {
            remaining
        } else {
            Quantity::zero()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PurchaseOrder {
    pub id: String,
    pub po_number: String,
    pub date: DateTime<Utc>,
    pub supplier: String,
    pub expected_delivery_date: Option<NaiveDate>,
    pub items: Vec<PurchaseOrderItem>,
    /// Always equal to `purchasing::derive_status(&items)`.
    pub status: PurchaseOrderStatus,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GoodsReceiptItem {
    pub variant_id: String,
    pub name: String,
    pub quantity_received: Quantity,
}

/// Record of physically received stock against a purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GoodsReceiptNote {
    pub id: String,
    pub date: DateTime<Utc>,
    pub purchase_order_id: String,
    pub purchase_order_number: String,
    pub supplier: String,
    pub items: Vec<GoodsReceiptItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum InvoiceStatus {
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InvoiceLine {
    pub description: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PurchaseInvoice {
    pub id: String,
    pub invoice_number: String,
    pub date: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub goods_receipt_id: Option<String>,
    pub supplier: String,
    pub items: Vec<InvoiceLine>,
    pub total: Money,
    pub status: InvoiceStatus,
}

// =============================================================================
// Audit & Notifications
// =============================================================================

/// Append-only audit row written before a destructive stock overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StockAdjustmentLog {
    pub id: String,
    pub date: DateTime<Utc>,
    pub user: String,
    pub variant_id: String,
    /// Aggregate stock as read before the overwrite.
    pub previous_stock: Quantity,
    pub new_stock: Quantity,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum NotificationKind {
    LowStock,
    OutOfStock,
}

/// A stock warning; identity is `(variant_id, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Notification {
    pub id: String,
    pub variant_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant() -> Variant {
        Variant {
            id: "v1".to_string(),
            product_id: "p1".to_string(),
            attributes: BTreeMap::from([
                ("Colour".to_string(), "Red".to_string()),
                ("Size".to_string(), "M".to_string()),
            ]),
            sku: "TEE-RED-M".to_string(),
            barcode: None,
            price: Money::from_cents(1500),
            cost: Money::from_cents(700),
            tax_rate: TaxRate::from_bps(1600),
            reorder_point: Quantity::from_units(5),
            selling_method: SellingMethod::Each,
            storage_uom: "pcs".to_string(),
        }
    }

    #[test]
    fn test_tax_rate_parse_fraction() {
        assert_eq!(TaxRate::parse_fraction("0.16").unwrap().bps(), 1600);
        assert_eq!(TaxRate::parse_fraction("0.0825").unwrap().bps(), 825);
        assert_eq!(TaxRate::parse_fraction("0").unwrap(), TaxRate::zero());
        assert!(TaxRate::parse_fraction("-0.1").is_err());
        assert!(TaxRate::parse_fraction("sixteen").is_err());
        assert_eq!(TaxRate::from_bps(825).to_string(), "8.25%");
    }

    #[test]
    fn test_cart_item_freezes_variant() {
        let item = CartItem::from_variant("Tee", &variant(), Quantity::from_units(2));
        assert_eq!(item.name, "Tee (Red / M)");
        assert_eq!(item.line_total().cents(), 3000);
        assert_eq!(item.tax().cents(), 480);
    }

    #[test]
    fn test_transaction_type_field_name() {
        let tx = Transaction {
            id: "t1".to_string(),
            date: Utc::now(),
            items: vec![],
            subtotal: Money::zero(),
            tax: Money::zero(),
            total: Money::zero(),
            amount_paid: Money::zero(),
            customer: None,
            payment_methods: vec![],
            status: TransactionStatus::Completed,
            kind: TransactionKind::Sale,
            user: "u1".to_string(),
            original_transaction_id: None,
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "Sale");
        assert_eq!(json["status"], "Completed");
        assert!(json.get("amountPaid").is_some());
    }

    #[test]
    fn test_po_status_wire_names() {
        let json = serde_json::to_value(PurchaseOrderStatus::PartiallyReceived).unwrap();
        assert_eq!(json, "Partially Received");
        assert_eq!(PurchaseOrderStatus::PartiallyReceived.to_string(), "Partially Received");
    }

    #[test]
    fn test_outstanding_never_negative() {
        let item = PurchaseOrderItem {
            variant_id: "v1".to_string(),
            quantity_ordered: Quantity::from_units(5),
            quantity_received: Quantity::from_units(7),
            cost: Money::from_cents(100),
            tax_rate: TaxRate::zero(),
        };
        assert_eq!(item.outstanding(), Quantity::zero());
    }
}
