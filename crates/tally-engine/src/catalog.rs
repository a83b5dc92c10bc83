//! # Catalog Workflows
//!
//! Creating products and variants, with optional opening stock, by hand or
//! from an inventory CSV.
//!
//! SKU uniqueness is an application check made before the first write:
//!
//! | SKU already stored on…  | create / add_variant | import            |
//! |-------------------------|----------------------|-------------------|
//! | nothing                 | written              | written           |
//! | the same product        | validation error     | skipped (re-run)  |
//! | a different product     | consistency error    | consistency error |
//!
//! Two terminals binding the same new SKU at the same moment both succeed.

use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tally_core::import::{self, ImportedProduct, ImportedVariant};
use tally_core::ledger::{self, ProductLedger, VariantLedger};
use tally_core::validation::{validate_price, validate_product_name, validate_sku, validate_stock_count, validate_tax_rate};
use tally_core::{
    new_id, Lot, Money, Product, Quantity, SellingMethod, TaxRate, ValidationError, Variant,
};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::saga::{self, Saga};
use crate::Engine;

/// "Tee (Red / M)" or just "Mug" for a variant without attributes.
pub fn display_name(product_name: &str, variant: &Variant) -> String {
    let label = variant.attribute_label();
    if label.is_empty() {
        product_name.to_string()
    } else {
        format!("{} ({})", product_name, label)
    }
}

// =============================================================================
// Inputs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningLot {
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVariant {
    pub attributes: BTreeMap<String, String>,
    pub sku: String,
    pub barcode: Option<String>,
    pub price: Money,
    pub cost: Money,
    pub tax_rate: TaxRate,
    pub reorder_point: Quantity,
    pub selling_method: SellingMethod,
    /// Blank means the selling method's default unit.
    pub storage_uom: String,
    pub opening: Option<OpeningLot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub brand: String,
    pub category: String,
    pub image_url: Option<String>,
    pub variants: Vec<NewVariant>,
}

impl From<ImportedVariant> for NewVariant {
    fn from(v: ImportedVariant) -> Self {
        NewVariant {
            attributes: v.attributes,
            sku: v.sku,
            barcode: v.barcode,
            price: v.price,
            cost: v.cost,
            tax_rate: v.tax_rate,
            reorder_point: v.reorder_point,
            selling_method: v.selling_method,
            storage_uom: v.storage_uom,
            opening: v.opening.map(|o| OpeningLot {
                lot_number: o.lot_number,
                expiry_date: o.expiry_date,
                quantity: o.quantity,
            }),
        }
    }
}

impl From<ImportedProduct> for NewProduct {
    fn from(p: ImportedProduct) -> Self {
        NewProduct {
            name: p.name,
            brand: p.brand,
            category: p.category,
            image_url: p.image_url,
            variants: p.variants.into_iter().map(NewVariant::from).collect(),
        }
    }
}

/// What an import wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub products_created: usize,
    pub variants_created: usize,
    pub opening_lots: usize,
    /// SKUs already stored on the same product.
    pub skipped_skus: Vec<String>,
}

// =============================================================================
// Building records
// =============================================================================

fn validate_variant(new: &NewVariant) -> EngineResult<()> {
    validate_sku(&new.sku)?;
    validate_price("price", new.price)?;
    validate_price("cost", new.cost)?;
    validate_tax_rate(new.tax_rate)?;
    validate_stock_count(new.reorder_point, new.selling_method)?;
    if let Some(opening) = &new.opening {
        validate_stock_count(opening.quantity, new.selling_method)?;
    }
    Ok(())
}

fn build_variant(product_id: &str, new: NewVariant) -> (Variant, Option<Lot>) {
    let storage_uom = match new.storage_uom.trim() {
        "" => new.selling_method.default_uom().to_string(),
        uom => uom.to_string(),
    };
    let variant = Variant {
        id: new_id(),
        product_id: product_id.to_string(),
        attributes: new.attributes,
        sku: new.sku.trim().to_string(),
        barcode: new
            .barcode
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty()),
        price: new.price,
        cost: new.cost,
        tax_rate: new.tax_rate,
        reorder_point: new.reorder_point,
        selling_method: new.selling_method,
        storage_uom,
    };
    let lot = new
        .opening
        .filter(|o| o.quantity.is_positive())
        .map(|o| {
            ledger::opening_lot(
                &variant.id,
                o.lot_number.as_deref(),
                o.quantity,
                o.expiry_date,
                Utc::now(),
            )
        });
    (variant, lot)
}

fn build_product(new: &NewProduct) -> Product {
    Product {
        id: new_id(),
        name: new.name.trim().to_string(),
        category: new.category.trim().to_string(),
        brand: new.brand.trim().to_string(),
        image_url: new.image_url.clone().filter(|u| !u.trim().is_empty()),
        created_at: Utc::now(),
    }
}

/// Rejects a SKU that appears twice in one request.
fn unique_skus<'a>(skus: impl IntoIterator<Item = &'a str>) -> EngineResult<()> {
    let mut seen = HashSet::new();
    for sku in skus {
        if !seen.insert(sku.trim()) {
            return Err(ValidationError::Duplicate {
                field: "sku".to_string(),
                value: sku.trim().to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Writes products, variants and opening lots in that order.
async fn write_catalog(records: tally_db::Records, workflow: &'static str, products: Vec<Product>, variants: Vec<Variant>, lots: Vec<Lot>) -> EngineResult<()> {
    saga::detached(workflow, async move {
        let mut saga = Saga::start(workflow);

        if let Err(e) = records.products().insert_many(&products).await {
            return Err(saga.fail(e.into(), "products not saved"));
        }
        saga.commit("products", products.iter().map(|p| p.id.clone()));

        if let Err(e) = records.variants().insert_many(&variants).await {
            return Err(saga.fail(
                e.into(),
                "products were saved without their variants; add the variants or delete the products",
            ));
        }
        saga.commit("variants", variants.iter().map(|v| v.id.clone()));

        if let Err(e) = records.lots().insert_many(&lots).await {
            return Err(saga.fail(
                e.into(),
                "variants were saved but opening stock was not; receive or adjust the stock manually",
            ));
        }
        saga.commit("opening_lots", lots.iter().map(|l| l.id.clone()));
        saga.complete();
        Ok(())
    })
    .await
}

impl Engine {
    /// Display names for variants, keyed by variant id. Unknown ids are left out.
    pub async fn variant_names(&self, variant_ids: &[String]) -> EngineResult<HashMap<String, String>> {
        let variants = self.records().variants().by_ids(variant_ids).await?;
        let mut products: HashMap<String, String> = HashMap::new();
        let mut names = HashMap::new();
        for variant in variants {
            if !products.contains_key(&variant.product_id) {
                let name = self
                    .records()
                    .products()
                    .get(&variant.product_id)
                    .await?
                    .map(|p| p.name)
                    .unwrap_or_default();
                products.insert(variant.product_id.clone(), name);
            }
            let product_name = products
                .get(&variant.product_id)
                .map(String::as_str)
                .unwrap_or_default();
            names.insert(variant.id.clone(), display_name(product_name, &variant));
        }
        Ok(names)
    }

    /// Fails if any SKU is stored on a product other than `owner`.
    ///
    /// Returns the SKUs already stored on `owner`.
    async fn check_skus(&self, skus: &[&str], owner: Option<&str>) -> EngineResult<Vec<Variant>> {
        let existing = self.records().variants().by_skus(skus).await?;
        let mut mine = Vec::new();
        for variant in existing {
            if Some(variant.product_id.as_str()) == owner {
                mine.push(variant);
            } else {
                return Err(EngineError::consistency(format!(
                    "SKU {} is already used by product {}",
                    variant.sku, variant.product_id
                )));
            }
        }
        Ok(mine)
    }

    pub async fn create_product(&self, new: NewProduct) -> EngineResult<ProductLedger> {
        validate_product_name(&new.name)?;
        if new.variants.is_empty() {
            return Err(ValidationError::required("variants").into());
        }
        for variant in &new.variants {
            validate_variant(variant)?;
        }
        unique_skus(new.variants.iter().map(|v| v.sku.as_str()))?;
        let skus: Vec<&str> = new.variants.iter().map(|v| v.sku.trim()).collect();
        self.check_skus(&skus, None).await?;

        let product = build_product(&new);
        let (variants, lots): (Vec<Variant>, Vec<Option<Lot>>) = new
            .variants
            .into_iter()
            .map(|v| build_variant(&product.id, v))
            .unzip();
        let lots: Vec<Lot> = lots.into_iter().flatten().collect();

        info!(
            product_id = %product.id,
            name = %product.name,
            variants = variants.len(),
            opening_lots = lots.len(),
            "Creating product"
        );
        write_catalog(
            self.records().clone(),
            "create_product",
            vec![product.clone()],
            variants.clone(),
            lots.clone(),
        )
        .await?;

        ledger::assemble(vec![product], variants, lots)
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Internal("product ledger not assembled".to_string()))
    }

    pub async fn add_variant(&self, product_id: &str, new: NewVariant) -> EngineResult<VariantLedger> {
        let product = self.records().products().require(product_id).await?;
        validate_variant(&new)?;
        if !self
            .check_skus(&[new.sku.trim()], Some(product.id.as_str()))
            .await?
            .is_empty()
        {
            return Err(ValidationError::Duplicate {
                field: "sku".to_string(),
                value: new.sku.trim().to_string(),
            }
            .into());
        }

        let (variant, lot) = build_variant(&product.id, new);
        info!(product_id = %product.id, sku = %variant.sku, "Adding variant");

        let records = self.records().clone();
        let result = variant.clone();
        saga::detached("add_variant", async move {
            let mut saga = Saga::start("add_variant");
            if let Err(e) = records.variants().insert(&variant).await {
                return Err(saga.fail(e.into(), "variant not saved"));
            }
            saga.commit("variant", [variant.id.clone()]);

            let lots: Vec<Lot> = lot.into_iter().collect();
            if let Err(e) = records.lots().insert_many(&lots).await {
                return Err(saga.fail(
                    e.into(),
                    format!(
                        "variant {} was saved but its opening stock was not; receive or adjust the stock manually",
                        variant.sku
                    ),
                ));
            }
            saga.commit("opening_lot", lots.iter().map(|l| l.id.clone()));
            saga.complete();
            Ok(VariantLedger {
                variant: result,
                lots,
            })
        })
        .await
    }

    /// Bulk-loads products from an inventory CSV.
    ///
    /// Every row is validated first; one bad row rejects the whole file.
    /// Products are matched to stored ones by name, so re-running a file
    /// skips what it already created.
    pub async fn import_inventory(&self, csv: &str) -> EngineResult<ImportSummary> {
        let plan = import::parse_inventory_csv(csv)?;
        let mut summary = ImportSummary::default();
        let mut products = Vec::new();
        let mut variants = Vec::new();
        let mut lots = Vec::new();

        for imported in plan.products {
            let new = NewProduct::from(imported);
            validate_product_name(&new.name)?;
            let stored = self.records().products().by_name(new.name.trim()).await?;
            let skus: Vec<&str> = new.variants.iter().map(|v| v.sku.trim()).collect();
            let already: HashSet<String> = self
                .check_skus(&skus, stored.as_ref().map(|p| p.id.as_str()))
                .await?
                .into_iter()
                .map(|v| v.sku)
                .collect();

            let product = match stored {
                Some(p) => p,
                None => {
                    let p = build_product(&new);
                    products.push(p.clone());
                    p
                }
            };
            for variant in new.variants {
                validate_variant(&variant)?;
                if already.contains(variant.sku.trim()) {
                    warn!(sku = %variant.sku, "SKU already imported, skipping");
                    summary.skipped_skus.push(variant.sku.trim().to_string());
                    continue;
                }
                let (variant, lot) = build_variant(&product.id, variant);
                variants.push(variant);
                lots.extend(lot);
            }
        }

        summary.products_created = products.len();
        summary.variants_created = variants.len();
        summary.opening_lots = lots.len();
        info!(
            products = summary.products_created,
            variants = summary.variants_created,
            opening_lots = summary.opening_lots,
            skipped = summary.skipped_skus.len(),
            "Importing inventory"
        );
        write_catalog(self.records().clone(), "import_inventory", products, variants, lots).await?;
        Ok(summary)
    }
}
