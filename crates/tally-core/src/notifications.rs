//! # Stock Notifications
//!
//! Low-stock and out-of-stock notifications are derived from aggregated stock
//! and reconciled against the stored set, so a notification that was already
//! acknowledged stays read for as long as the condition holds.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  identity = (variantId, kind)                                          │
//! │                                                                         │
//! │  condition now   stored    →  action                                   │
//! │  ─────────────   ──────       ──────                                   │
//! │  yes             no           insert unread                            │
//! │  yes             yes          keep, refresh message (read untouched)   │
//! │  no              yes          delete                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::ledger::{ProductLedger, StockLevel};
use crate::types::{new_id, Notification, NotificationKind};

/// Difference between the stored notifications and the current stock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// The full notification set after applying the difference.
    pub current: Vec<Notification>,
    pub to_insert: Vec<Notification>,
    /// Kept notifications whose message changed, with the new message.
    pub to_update: Vec<Notification>,
    /// Ids of stored notifications whose condition has cleared (or duplicates).
    pub to_delete: Vec<String>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Notifications the current stock calls for, as `(variant_id, kind, message)`.
fn wanted(ledgers: &[ProductLedger]) -> Vec<(String, NotificationKind, String)> {
    let mut out = Vec::new();
    for product in ledgers {
        for ledger in &product.variants {
            let variant = &ledger.variant;
            let label = variant.attribute_label();
            let name = if label.is_empty() {
                format!("{} ({})", product.product.name, variant.sku)
            } else {
                format!("{} {} ({})", product.product.name, label, variant.sku)
            };
            match ledger.level() {
                StockLevel::Low => out.push((
                    variant.id.clone(),
                    NotificationKind::LowStock,
                    format!(
                        "{} is running low: {} {} left (reorder point {})",
                        name,
                        ledger.stock(),
                        variant.storage_uom,
                        variant.reorder_point
                    ),
                )),
                StockLevel::Out => out.push((
                    variant.id.clone(),
                    NotificationKind::OutOfStock,
                    format!("{} is out of stock", name),
                )),
                StockLevel::InStock => {}
            }
        }
    }
    out
}

/// Reconciles `existing` against the stock in `ledgers`.
pub fn reconcile(existing: &[Notification], ledgers: &[ProductLedger], now: DateTime<Utc>) -> Reconciliation {
    let wanted = wanted(ledgers);
    let wanted_messages: HashMap<(&str, NotificationKind), &str> = wanted
        .iter()
        .map(|(variant_id, kind, message)| ((variant_id.as_str(), *kind), message.as_str()))
        .collect();

    let mut result = Reconciliation::default();
    let mut seen: HashSet<(String, NotificationKind)> = HashSet::new();

    for notification in existing {
        let key = (notification.variant_id.clone(), notification.kind);
        let message = wanted_messages.get(&(notification.variant_id.as_str(), notification.kind));
        match message {
            Some(message) if seen.insert(key) => {
                let mut kept = notification.clone();
                if kept.message != *message {
                    kept.message = message.to_string();
                    result.to_update.push(kept.clone());
                }
                result.current.push(kept);
            }
            _ => result.to_delete.push(notification.id.clone()),
        }
    }

    for (variant_id, kind, message) in wanted {
        if seen.contains(&(variant_id.clone(), kind)) {
            continue;
        }
        let notification = Notification {
            id: new_id(),
            variant_id: variant_id.clone(),
            kind,
            message,
            read: false,
            created_at: now,
        };
        seen.insert((variant_id, kind));
        result.current.push(notification.clone());
        result.to_insert.push(notification);
    }

    result
}

/// Count of notifications not yet acknowledged.
pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.read).count()
}
