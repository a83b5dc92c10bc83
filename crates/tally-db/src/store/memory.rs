//! In-process record store.
//!
//! Same contract as the SQLite store; used by tests and for dry runs.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

use super::{apply_patch, row_id, Collection, Filter, RecordStore, Row};
use crate::error::{DbError, DbResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in a collection.
    pub async fn count(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn select(&self, collection: Collection, filter: &Filter) -> DbResult<Vec<Row>> {
        let guard = self.collections.read().await;
        let rows: Vec<Row> = guard
            .get(&collection)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        debug!(collection = %collection, count = rows.len(), "memory select");
        Ok(rows)
    }

    async fn insert(&self, collection: Collection, rows: Vec<Row>) -> DbResult<Vec<Row>> {
        let mut guard = self.collections.write().await;
        let existing = guard.entry(collection).or_default();

        let mut ids: HashSet<String> = existing
            .iter()
            .filter_map(|r| row_id(collection, r).ok())
            .collect();
        for row in &rows {
            let id = row_id(collection, row)?;
            if !ids.insert(id.clone()) {
                return Err(DbError::duplicate(format!("{}.id", collection), id));
            }
        }

        existing.extend(rows.iter().cloned());
        debug!(collection = %collection, count = rows.len(), "memory insert");
        Ok(rows)
    }

    async fn update(&self, collection: Collection, filter: &Filter, patch: Row) -> DbResult<u64> {
        let mut guard = self.collections.write().await;
        let mut count = 0;
        if let Some(rows) = guard.get_mut(&collection) {
            for row in rows.iter_mut().filter(|r| filter.matches(r)) {
                apply_patch(row, &patch);
                count += 1;
            }
        }
        debug!(collection = %collection, count, "memory update");
        Ok(count)
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> DbResult<u64> {
        let mut guard = self.collections.write().await;
        let mut count = 0;
        if let Some(rows) = guard.get_mut(&collection) {
            let before = rows.len();
            rows.retain(|r| !filter.matches(r));
            count = (before - rows.len()) as u64;
        }
        debug!(collection = %collection, count, "memory delete");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn test_insert_select_in_order() {
        let store = MemoryStore::new();
        store
            .insert(
                Collection::Lots,
                vec![
                    row(json!({ "id": "a", "variant_id": "v1" })),
                    row(json!({ "id": "b", "variant_id": "v2" })),
                    row(json!({ "id": "c", "variant_id": "v1" })),
                ],
            )
            .await
            .unwrap();

        let rows = store
            .select(Collection::Lots, &Filter::eq("variant_id", "v1"))
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(store.count(Collection::Products).await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_all_or_nothing() {
        let store = MemoryStore::new();
        store
            .insert(Collection::Lots, vec![row(json!({ "id": "a" }))])
            .await
            .unwrap();

        let err = store
            .insert(
                Collection::Lots,
                vec![row(json!({ "id": "b" })), row(json!({ "id": "a" }))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(store.count(Collection::Lots).await, 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_counts() {
        let store = MemoryStore::new();
        store
            .insert(
                Collection::Transactions,
                vec![
                    row(json!({ "id": "t1", "status": "Completed" })),
                    row(json!({ "id": "t2", "status": "Completed" })),
                ],
            )
            .await
            .unwrap();

        let updated = store
            .update(
                Collection::Transactions,
                &Filter::id("t1"),
                row(json!({ "status": "Void" })),
            )
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let void = store
            .select(Collection::Transactions, &Filter::eq("status", "Void"))
            .await
            .unwrap();
        assert_eq!(void.len(), 1);

        let deleted = store
            .delete(Collection::Transactions, &Filter::All)
            .await
            .unwrap();
        assert_eq!(deleted, 2);
    }
}
