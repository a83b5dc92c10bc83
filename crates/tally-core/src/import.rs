//! # Inventory CSV Import
//!
//! Parses the bulk-load format into products with variants and opening stock.
//!
//! ## Format
//! ```text
//! name,brand,category,imageUrl,sellingMethod,storageUom,attributesJSON,sku,
//! barcode,price,cost,taxRate,reorderPoint,lotNumber,expiryDate,quantity
//!
//! Crew Tee,Acme,Apparel,,Each,pcs,"{""Size"":""M""}",TEE-M,,15.00,7.00,0.16,5,B1,,20
//! Crew Tee,Acme,Apparel,,Each,pcs,"{""Size"":""L""}",TEE-L,,15.00,7.00,0.16,5,B1,,12
//!          ▲
//!          └── rows sharing a product name become one product
//! ```
//!
//! Every row is checked and every problem is collected; a file with any row
//! error is rejected as a whole.

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::error::{CoreError, CoreResult, ImportRowError, ValidationError};
use crate::money::Money;
use crate::quantity::{Quantity, SellingMethod};
use crate::types::TaxRate;
use crate::validation::{validate_price, validate_product_name, validate_sku, validate_tax_rate};

/// Column order of the import format.
pub const COLUMNS: [&str; 16] = [
    "name",
    "brand",
    "category",
    "imageUrl",
    "sellingMethod",
    "storageUom",
    "attributesJSON",
    "sku",
    "barcode",
    "price",
    "cost",
    "taxRate",
    "reorderPoint",
    "lotNumber",
    "expiryDate",
    "quantity",
];

/// Opening stock for an imported variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningStock {
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedVariant {
    /// 1-based data row the variant came from.
    pub row: usize,
    pub attributes: BTreeMap<String, String>,
    pub sku: String,
    pub barcode: Option<String>,
    pub price: Money,
    pub cost: Money,
    pub tax_rate: TaxRate,
    pub reorder_point: Quantity,
    pub selling_method: SellingMethod,
    pub storage_uom: String,
    pub opening: Option<OpeningStock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedProduct {
    pub name: String,
    pub brand: String,
    pub category: String,
    pub image_url: Option<String>,
    pub variants: Vec<ImportedVariant>,
}

/// Result of a successful parse, ready to be written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPlan {
    pub products: Vec<ImportedProduct>,
}

impl ImportPlan {
    pub fn variant_count(&self) -> usize {
        self.products.iter().map(|p| p.variants.len()).sum()
    }

    pub fn skus(&self) -> impl Iterator<Item = &str> {
        self.products
            .iter()
            .flat_map(|p| p.variants.iter().map(|v| v.sku.as_str()))
    }
}

// =============================================================================
// Field parsing
// =============================================================================

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn money_field(field: &str, value: &str, required: bool) -> Result<Money, ValidationError> {
    if value.trim().is_empty() {
        return if required {
            Err(ValidationError::required(field))
        } else {
            Ok(Money::zero())
        };
    }
    let amount = Money::parse_decimal(value)
        .map_err(|_| ValidationError::invalid(field, format!("'{}' is not a number", value.trim())))?;
    validate_price(field, amount)?;
    Ok(amount)
}

fn quantity_field(field: &str, value: &str, method: SellingMethod) -> Result<Option<Quantity>, ValidationError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    let qty: Quantity = value
        .parse()
        .map_err(|_| ValidationError::invalid(field, format!("'{}' is not a number", value.trim())))?;
    if qty < Quantity::zero() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    if !method.accepts(qty) {
        return Err(ValidationError::invalid(
            field,
            format!("{} is not a whole number for a unit-sold item", qty),
        ));
    }
    Ok(Some(qty))
}

fn attributes_field(value: &str) -> Result<BTreeMap<String, String>, ValidationError> {
    if value.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let parsed: Value = serde_json::from_str(value)
        .map_err(|e| ValidationError::invalid("attributesJSON", e.to_string()))?;
    let Value::Object(map) = parsed else {
        return Err(ValidationError::invalid("attributesJSON", "must be a JSON object"));
    };
    map.into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k, s)),
            Value::Number(n) => Ok((k, n.to_string())),
            Value::Bool(b) => Ok((k, b.to_string())),
            _ => Err(ValidationError::invalid(
                "attributesJSON",
                format!("value of '{}' must be text", k),
            )),
        })
        .collect()
}

fn date_field(field: &str, value: &str) -> Result<Option<NaiveDate>, ValidationError> {
    match optional(value) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(&v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ValidationError::invalid(field, format!("'{}' is not a YYYY-MM-DD date", v))),
    }
}

struct ParsedRow {
    name: String,
    brand: String,
    category: String,
    image_url: Option<String>,
    variant: ImportedVariant,
}

/// Parses one data row, collecting every field error.
fn parse_row(row: usize, record: &StringRecord) -> Result<ParsedRow, Vec<ImportRowError>> {
    let mut errors = Vec::new();
    let mut fail = |e: ValidationError| {
        errors.push(ImportRowError {
            row,
            message: e.to_string(),
        })
    };

    if record.len() != COLUMNS.len() {
        fail(ValidationError::invalid(
            "row",
            format!("expected {} columns, found {}", COLUMNS.len(), record.len()),
        ));
        return Err(errors);
    }
    let col = |idx: usize| record.get(idx).unwrap_or("").trim();

    let name = col(0).to_string();
    if let Err(e) = validate_product_name(&name) {
        fail(e);
    }
    let sku = col(7).to_string();
    if let Err(e) = validate_sku(&sku) {
        fail(e);
    }

    let selling_method = col(4).parse::<SellingMethod>().unwrap_or_else(|e| {
        fail(e);
        SellingMethod::Each
    });
    let attributes = attributes_field(col(6)).unwrap_or_else(|e| {
        fail(e);
        BTreeMap::new()
    });
    let price = money_field("price", col(9), true).unwrap_or_else(|e| {
        fail(e);
        Money::zero()
    });
    let cost = money_field("cost", col(10), false).unwrap_or_else(|e| {
        fail(e);
        Money::zero()
    });
    let tax_rate = if col(11).is_empty() {
        TaxRate::zero()
    } else {
        TaxRate::parse_fraction(col(11))
            .and_then(|r| validate_tax_rate(r).map(|_| r))
            .unwrap_or_else(|e| {
                fail(e);
                TaxRate::zero()
            })
    };
    let reorder_point = quantity_field("reorderPoint", col(12), selling_method)
        .unwrap_or_else(|e| {
            fail(e);
            None
        })
        .unwrap_or_default();
    let expiry_date = date_field("expiryDate", col(14)).unwrap_or_else(|e| {
        fail(e);
        None
    });
    let quantity = quantity_field("quantity", col(15), selling_method).unwrap_or_else(|e| {
        fail(e);
        None
    });

    if !errors.is_empty() {
        return Err(errors);
    }

    let opening = quantity
        .filter(|q| q.is_positive())
        .map(|quantity| OpeningStock {
            lot_number: optional(col(13)),
            expiry_date,
            quantity,
        });
    let storage_uom =
        optional(col(5)).unwrap_or_else(|| selling_method.default_uom().to_string());

    Ok(ParsedRow {
        name,
        brand: col(1).to_string(),
        category: col(2).to_string(),
        image_url: optional(col(3)),
        variant: ImportedVariant {
            row,
            attributes,
            sku,
            barcode: optional(col(8)),
            price,
            cost,
            tax_rate,
            reorder_point,
            selling_method,
            storage_uom,
            opening,
        },
    })
}

// =============================================================================
// Entry point
// =============================================================================

/// Parses an import file.
///
/// ## Errors
/// [`CoreError::ImportRejected`] carrying every row error found, including
/// SKUs repeated inside the file. Nothing is returned for partial success.
pub fn parse_inventory_csv(input: &str) -> CoreResult<ImportPlan> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input.as_bytes());

    let mut errors: Vec<ImportRowError> = Vec::new();
    let mut products: Vec<ImportedProduct> = Vec::new();
    let mut seen_skus: HashSet<String> = HashSet::new();

    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                errors.push(ImportRowError {
                    row,
                    message: e.to_string(),
                });
                continue;
            }
        };
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let parsed = match parse_row(row, &record) {
            Ok(p) => p,
            Err(mut row_errors) => {
                errors.append(&mut row_errors);
                continue;
            }
        };

        if !seen_skus.insert(parsed.variant.sku.clone()) {
            errors.push(ImportRowError {
                row,
                message: ValidationError::Duplicate {
                    field: "sku".to_string(),
                    value: parsed.variant.sku.clone(),
                }
                .to_string(),
            });
            continue;
        }

        match products.iter_mut().find(|p| p.name == parsed.name) {
            Some(product) => product.variants.push(parsed.variant),
            None => products.push(ImportedProduct {
                name: parsed.name,
                brand: parsed.brand,
                category: parsed.category,
                image_url: parsed.image_url,
                variants: vec![parsed.variant],
            }),
        }
    }

    if !errors.is_empty() {
        return Err(CoreError::ImportRejected(errors));
    }
    if products.is_empty() {
        return Err(CoreError::ImportRejected(vec![ImportRowError {
            row: 0,
            message: "file contains no data rows".to_string(),
        }]));
    }
    Ok(ImportPlan { products })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "name,brand,category,imageUrl,sellingMethod,storageUom,attributesJSON,sku,barcode,price,cost,taxRate,reorderPoint,lotNumber,expiryDate,quantity";

    fn file(rows: &[&str]) -> String {
        let mut out = HEADER.to_string();
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    fn row_errors(result: CoreResult<ImportPlan>) -> Vec<ImportRowError> {
        match result {
            Err(CoreError::ImportRejected(errors)) => errors,
            other => panic!("expected ImportRejected, got {:?}", other),
        }
    }

    #[test]
    fn test_rows_group_by_product_name() {
        let plan = parse_inventory_csv(&file(&[
            r#"Crew Tee,Acme,Apparel,,Each,pcs,"{""Size"":""M""}",TEE-M,,15.00,7.00,0.16,5,B1,,20"#,
            r#"Crew Tee,Acme,Apparel,,Each,pcs,"{""Size"":""L""}",TEE-L,,15.00,7.00,0.16,5,B1,,12"#,
            "Coffee Beans,Roastery,Grocery,,Weight,kg,,BEAN-1,,24.50,12,0.08,2.5,R7,2027-03-01,10.250",
        ]))
        .unwrap();

        assert_eq!(plan.products.len(), 2);
        assert_eq!(plan.variant_count(), 3);

        let tee = &plan.products[0];
        assert_eq!(tee.variants.len(), 2);
        assert_eq!(tee.variants[0].attributes.get("Size").map(String::as_str), Some("M"));
        assert_eq!(tee.variants[0].price.cents(), 1500);
        assert_eq!(tee.variants[0].tax_rate.bps(), 1600);
        assert_eq!(
            tee.variants[1].opening.as_ref().map(|o| o.quantity),
            Some(Quantity::from_units(12))
        );

        let beans = &plan.products[1].variants[0];
        assert_eq!(beans.selling_method, SellingMethod::Weight);
        assert_eq!(beans.reorder_point.thousandths(), 2500);
        let opening = beans.opening.as_ref().unwrap();
        assert_eq!(opening.quantity.thousandths(), 10_250);
        assert_eq!(opening.expiry_date, NaiveDate::from_ymd_opt(2027, 3, 1));
    }

    #[test]
    fn test_errors_are_accumulated_across_rows() {
        let errors = row_errors(parse_inventory_csv(&file(&[
            ",Acme,Apparel,,Each,pcs,,,,15.00,7.00,0.16,5,,,1",
            "Mug,Acme,Kitchen,,Each,pcs,{not json},MUG-1,,abc,7.00,0.16,5,,,1",
            "Jar,Acme,Kitchen,,Bundle,pcs,,JAR-1,,2.00,1.00,0.16,5,,31-12-2026,1",
        ])));

        let rows: Vec<usize> = errors.iter().map(|e| e.row).collect();
        // row 1: name + sku; row 2: attributes + price; row 3: method + date
        assert_eq!(rows, vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_duplicate_sku_in_file_rejected() {
        let errors = row_errors(parse_inventory_csv(&file(&[
            "Mug,Acme,Kitchen,,Each,pcs,,MUG-1,,8.00,3.00,0,5,,,4",
            "Mug,Acme,Kitchen,,Each,pcs,,MUG-1,,8.00,3.00,0,5,,,4",
        ])));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row, 2);
    }

    #[test]
    fn test_fractional_quantity_for_each_item_rejected() {
        let errors = row_errors(parse_inventory_csv(&file(&[
            "Mug,Acme,Kitchen,,Each,pcs,,MUG-1,,8.00,3.00,0,5,,,1.5",
        ])));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("quantity"));
    }

    #[test]
    fn test_wrong_column_count_and_empty_file() {
        let errors = row_errors(parse_inventory_csv(&file(&["Mug,Acme"])));
        assert_eq!(errors.len(), 1);

        let errors = row_errors(parse_inventory_csv(HEADER));
        assert_eq!(errors[0].row, 0);
    }

    #[test]
    fn test_optional_fields_default() {
        let plan = parse_inventory_csv(&file(&["Mug,Acme,Kitchen,,,,,MUG-1,,8.00,,,,,,"])).unwrap();
        let v = &plan.products[0].variants[0];
        assert_eq!(v.selling_method, SellingMethod::Each);
        assert_eq!(v.storage_uom, "pcs");
        assert_eq!(v.cost, Money::zero());
        assert_eq!(v.tax_rate, TaxRate::zero());
        assert!(v.opening.is_none());
    }
}
