//! # Sales Repositories
//!
//! Customers and sale/return transactions.

use chrono::{DateTime, Utc};
use serde_json::json;
use tally_core::{Customer, Transaction, TransactionKind, TransactionStatus};
use tracing::debug;

use super::Repository;
use crate::error::DbResult;
use crate::store::Filter;

impl Repository<Customer> {
    /// Looks a customer up by normalised phone number.
    ///
    /// Two terminals may both miss and both create; the first match wins.
    pub async fn by_phone(&self, phone: &str) -> DbResult<Option<Customer>> {
        Ok(self
            .find(&Filter::eq("phone", phone))
            .await?
            .into_iter()
            .next())
    }
}

impl Repository<Transaction> {
    /// Completed → Void is the only status change a transaction ever sees.
    pub async fn set_status(&self, id: &str, status: TransactionStatus) -> DbResult<()> {
        debug!(transaction_id = %id, status = ?status, "Updating transaction status");
        self.update_by_id(id, json!({ "status": status })).await
    }

    /// Return transactions recorded against a sale.
    pub async fn returns_for(&self, original_id: &str) -> DbResult<Vec<Transaction>> {
        let filter = Filter::eq("original_transaction_id", original_id).and(Filter::eq(
            "type",
            serde_json::to_value(TransactionKind::Return).unwrap_or_default(),
        ));
        self.find(&filter).await
    }

    /// Transactions dated within `[from, to)`, oldest first.
    pub async fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> DbResult<Vec<Transaction>> {
        let mut txs: Vec<Transaction> = self
            .all()
            .await?
            .into_iter()
            .filter(|t| t.date >= from && t.date < to)
            .collect();
        txs.sort_by_key(|t| t.date);
        Ok(txs)
    }
}
