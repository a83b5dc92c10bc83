//! # Catalog Repositories
//!
//! Products, variants and the lot ledger.

use tally_core::ledger;
use tally_core::{Lot, Product, Quantity, Variant};
use tracing::debug;

use super::Repository;
use crate::error::DbResult;
use crate::store::Filter;

impl Repository<Product> {
    pub async fn by_name(&self, name: &str) -> DbResult<Option<Product>> {
        Ok(self
            .find(&Filter::eq("name", name))
            .await?
            .into_iter()
            .next())
    }
}

impl Repository<Variant> {
    /// The variant bound to `sku`, if any. SKUs are unique by application check.
    pub async fn by_sku(&self, sku: &str) -> DbResult<Option<Variant>> {
        Ok(self
            .find(&Filter::eq("sku", sku.trim()))
            .await?
            .into_iter()
            .next())
    }

    /// Variants bound to any of `skus`.
    pub async fn by_skus(&self, skus: &[&str]) -> DbResult<Vec<Variant>> {
        if skus.is_empty() {
            return Ok(Vec::new());
        }
        self.find(&Filter::one_of("sku", skus.iter().copied())).await
    }

    pub async fn for_product(&self, product_id: &str) -> DbResult<Vec<Variant>> {
        self.find(&Filter::eq("product_id", product_id)).await
    }

    pub async fn by_ids(&self, ids: &[String]) -> DbResult<Vec<Variant>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.find(&Filter::one_of("id", ids.iter().cloned())).await
    }
}

impl Repository<Lot> {
    pub async fn for_variant(&self, variant_id: &str) -> DbResult<Vec<Lot>> {
        self.find(&Filter::eq("variant_id", variant_id)).await
    }

    /// Aggregated stock of one variant as currently stored.
    pub async fn stock_of(&self, variant_id: &str) -> DbResult<Quantity> {
        let lots = self.for_variant(variant_id).await?;
        let stock = ledger::stock_of(&lots);
        debug!(variant_id = %variant_id, lots = lots.len(), stock = %stock, "Aggregated stock");
        Ok(stock)
    }

    /// Removes every lot of a variant. Only the destructive adjustment calls this.
    pub async fn delete_for_variant(&self, variant_id: &str) -> DbResult<u64> {
        self.delete_where(&Filter::eq("variant_id", variant_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_fixtures::*;

    #[tokio::test]
    async fn test_variant_lookups() {
        let records = records();
        records
            .variants()
            .insert_many(&[variant("v1", "p1", "TEE-M"), variant("v2", "p1", "TEE-L"), variant("v3", "p2", "MUG")])
            .await
            .unwrap();

        let v = records.variants().by_sku(" TEE-L ").await.unwrap().unwrap();
        assert_eq!(v.id, "v2");
        assert!(records.variants().by_sku("NOPE").await.unwrap().is_none());
        assert_eq!(records.variants().for_product("p1").await.unwrap().len(), 2);
        assert_eq!(records.variants().by_skus(&["MUG", "TEE-M"]).await.unwrap().len(), 2);
        assert!(records.variants().by_skus(&[]).await.unwrap().is_empty());
        assert_eq!(
            records
                .variants()
                .by_ids(&["v3".to_string()])
                .await
                .unwrap()[0]
                .sku,
            "MUG"
        );
    }

    #[tokio::test]
    async fn test_lot_stock_and_delete() {
        let records = records();
        let lots = records.lots();
        lots.insert_many(&[lot("a", "v1", 10), lot("b", "v1", -3), lot("c", "v2", 4)])
            .await
            .unwrap();

        assert_eq!(lots.stock_of("v1").await.unwrap().whole_units(), 7);
        assert_eq!(lots.delete_for_variant("v1").await.unwrap(), 2);
        assert!(lots.stock_of("v1").await.unwrap().is_zero());
        assert_eq!(lots.stock_of("v2").await.unwrap().whole_units(), 4);
    }
}
