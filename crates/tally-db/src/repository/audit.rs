//! # Audit & Notification Repositories

use serde_json::json;
use tally_core::{Notification, StockAdjustmentLog};

use super::Repository;
use crate::error::DbResult;
use crate::store::Filter;

impl Repository<StockAdjustmentLog> {
    pub async fn for_variant(&self, variant_id: &str) -> DbResult<Vec<StockAdjustmentLog>> {
        self.find(&Filter::eq("variant_id", variant_id)).await
    }
}

impl Repository<Notification> {
    pub async fn mark_read(&self, id: &str) -> DbResult<()> {
        self.update_by_id(id, json!({ "read": true })).await
    }

    /// Rewrites the message only; the read flag is left alone.
    pub async fn set_message(&self, id: &str, message: &str) -> DbResult<()> {
        self.update_by_id(id, json!({ "message": message })).await
    }

    pub async fn delete_ids(&self, ids: &[String]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.delete_where(&Filter::one_of("id", ids.iter().cloned()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_fixtures::records;
    use super::*;
    use chrono::Utc;
    use tally_core::NotificationKind;

    fn notification(id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            variant_id: "v1".to_string(),
            kind: NotificationKind::LowStock,
            message: "Mug is running low".to_string(),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_mark_read_and_delete_ids() {
        let records = records();
        let repo = records.notifications();
        repo.insert_many(&[notification("n1"), notification("n2")])
            .await
            .unwrap();

        repo.mark_read("n1").await.unwrap();
        assert!(repo.require("n1").await.unwrap().read);
        assert!(!repo.require("n2").await.unwrap().read);

        repo.set_message("n1", "Mug is out of stock").await.unwrap();
        let n1 = repo.require("n1").await.unwrap();
        assert_eq!(n1.message, "Mug is out of stock");
        assert!(n1.read);

        assert_eq!(repo.delete_ids(&["n2".to_string()]).await.unwrap(), 1);
        assert_eq!(repo.delete_ids(&[]).await.unwrap(), 0);
        assert_eq!(repo.all().await.unwrap().len(), 1);
    }
}
