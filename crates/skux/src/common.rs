// ai
//! 📦 Common data structures: the building blocks of skux
//!
//! ---
//!
//! 🎬 COLD OPEN. INT. WAREHOUSE OFFICE, 6:12 AM
//!
//! 🌩️  The fluorescent lights hum. Someone exported the product catalogue
//! from a spreadsheet again. The prices are strings. The stock counts are
//! strings. One row has a product id with three trailing spaces, and nobody
//! will admit to typing it.
//!
//! ✅ And then a `ProductRecord` arrives. Trimmed. Typed. Stamped with the
//! exact second it was born. It knows its `product_id`. It knows its price
//! (as an actual number, like a civilized struct). It does not know that a
//! later row in the same file will overwrite it entirely. Relatable.
//!
//! 🦆
//!
//! This module defines the humble yet load-bearing structs that ferry rows
//! from a CSV file into a document store. They don't ask questions. They
//! carry the data. They are the forklifts of this codebase.

use serde::{Deserialize, Serialize};

/// 🧾 A raw row as the tabular reader hands it over: header name → loosely typed cell.
///
/// CSV cells show up as `Value::String`, empty cells as `Value::Null`.
/// In-memory sources are free to smuggle in numbers and bools. The normalizer
/// copes with all of it. The normalizer has seen things.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

/// 🏷️ The constant provenance tag stamped on every record this pipeline writes.
pub const SOURCE_TAG: &str = "sample_csv";

/// 🔑 The one field that decides who is who. Unique index lives here.
pub const IDENTITY_FIELD: &str = "product_id";

/// 🎯 A canonical product: one document, one destiny, one `product_id`.
///
/// Built exclusively by the normalizer and never mutated afterwards. Two
/// records with the same `product_id` are the same logical product, and the
/// later write wins the whole document. No field-level merge. No negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub price: f64,
    pub currency: String,
    pub stock: i64,
    /// ⏱️ unix seconds at normalization time. Differs between runs by design of the clock.
    pub ingested_at: i64,
    pub source: String,
}

/// 💀 One operation that the collection refused inside an otherwise happy batch.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteFailure {
    /// 📍 position of the failed op inside its batch
    pub index: usize,
    /// 🔢 store-specific error code (11000 = duplicate key, the classic)
    pub code: i32,
    pub message: String,
}

/// 📊 What a single bulk write reports back.
///
/// `matched` counts docs the filter found, `modified` the ones whose stored
/// state actually changed, `upserted` the brand new ones. A matched doc that
/// was written with identical values is matched but not modified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted: u64,
    pub write_errors: Vec<WriteFailure>,
}

/// 🧮 Running totals across every batch of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertTotals {
    pub batches: u64,
    pub matched: u64,
    pub modified: u64,
    pub upserted: u64,
    pub write_errors: u64,
}

impl UpsertTotals {
    /// ✅ Documents created or actually changed. The number everybody asks about.
    pub fn changed(&self) -> u64 {
        self.modified + self.upserted
    }

    /// 🔄 Fold one batch outcome into the running totals.
    pub(crate) fn absorb(&mut self, outcome: &BulkWriteOutcome) {
        self.batches += 1;
        self.matched += outcome.matched;
        self.modified += outcome.modified;
        self.upserted += outcome.upserted;
        self.write_errors += outcome.write_errors.len() as u64;
    }
}

/// 📜 The final word on a run: what was read, what was skipped, where the backup went.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub csv_path: String,
    pub rows_loaded: u64,
    /// 🚫 rows whose product_id came out blank and could not be keyed
    pub rows_skipped: u64,
    /// 🪣 object key of the raw-file backup, `None` when archival was skipped
    pub archive_key: Option<String>,
    pub totals: UpsertTotals,
}
