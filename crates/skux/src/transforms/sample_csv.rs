// ai
//! 🧾 Sample CSV Product Transform: raw catalogue row → [`ProductRecord`].
//!
//! 🎬 *[a spreadsheet exports itself. the columns are mostly right. mostly.]*
//!
//! Column names are looked up exactly as written in the header. Extra columns
//! are ignored. Missing columns fall back per the table in `transforms.rs`.
//!
//! ## Knowledge Graph 🧠
//! - Implements: `RowTransform`
//! - Coercion: `coerce::{text, float, integer}`
//! - Provenance: every record gets `source = SOURCE_TAG`

use super::RowTransform;
use super::coerce::{self, Coerced};
use crate::common::{ProductRecord, RawRow, SOURCE_TAG};
use tracing::debug;

const DEFAULT_CURRENCY: &str = "USD";

/// 🧾 SampleCsvProduct: the format whisperer for product catalogue rows.
pub(crate) struct SampleCsvProduct;

impl RowTransform for SampleCsvProduct {
    fn transform_row(row: &RawRow, ingested_at: i64) -> ProductRecord {
        let text_of = |field: &str| coerce::text(row.get(field)).or(String::new());

        ProductRecord {
            product_id: text_of("product_id"),
            name: text_of("name"),
            brand: text_of("brand"),
            category: text_of("category"),
            price: numeric_or_zero(row, "price", coerce::float(row.get("price")), 0.0),
            currency: coerce::text(row.get("currency")).or(DEFAULT_CURRENCY.to_string()),
            stock: numeric_or_zero(row, "stock", coerce::integer(row.get("stock")), 0),
            ingested_at,
            source: SOURCE_TAG.to_string(),
        }
    }
}

// -- 🔢 unparsable numerics are zeroed with a breadcrumb, missing ones silently
fn numeric_or_zero<T>(row: &RawRow, field: &str, coerced: Coerced<T>, zero: T) -> T {
    if matches!(coerced, Coerced::Unparsable) {
        debug!(
            "🧮 {} for product '{}' is not a number ({:?}); defaulting to zero",
            field,
            row.get("product_id").map(|id| id.to_string()).unwrap_or_default(),
            row.get(field)
        );
    }
    coerced.or(zero)
}
