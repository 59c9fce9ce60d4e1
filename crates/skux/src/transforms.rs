// ai
//! 🔄 Transforms: where spreadsheet chaos becomes typed records 🎭🚀
//!
//! 🎬 COLD OPEN. INT. CUSTOMS DESK, TERMINAL 3, 4:51 AM
//!
//! A row arrives. Its price is `" 9.99 "`. Its stock is `"5.0"`. Its currency
//! is missing entirely, like a passport left in a taxi. The customs officer
//! sighs, stamps it `"USD"`, and waves it through. Nobody gets detained.
//! Nobody ever gets detained. That's the policy. The line must keep moving.
//!
//! This module is that customs desk. Raw rows come in as loosely typed
//! `serde_json` maps. Canonical [`ProductRecord`]s come out. The conversion is
//! **total**: every field has a fallback, and no input, however cursed, makes
//! the normalizer return an error.
//!
//! ## Fallback table 📐
//!
//! ```text
//!   field        absent/null     unparsable      notes
//!   ─────────    ───────────     ──────────      ─────────────────────────
//!   strings      ""              (n/a)           trimmed; numbers/bools rendered
//!   currency     "USD"           (n/a)           blank also means "USD"
//!   price        0.0             0.0             non-finite (NaN, inf) → 0.0
//!   stock        0               0               floats truncate toward zero
//! ```
//!
//! ## Knowledge Graph 🧠
//! - Depends on: `common::{RawRow, ProductRecord}`
//! - Used by: `supervisors` (orchestrator normalizes every loaded row)
//! - Pattern: zero-sized marker type implementing [`RowTransform`], same as the
//!   monomorphized transforms of old, plus per-type coercion helpers in `coerce`
//!
//! 🦆 The duck is trimmed. The duck defaults to zero. The duck never raises.

use crate::common::{ProductRecord, RawRow};
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) mod coerce;
pub(crate) mod sample_csv;

pub(crate) use sample_csv::SampleCsvProduct;

/// 📥 RowTransform: converts one raw tabular row into a canonical record.
///
/// Implementors are zero-sized marker types. The timestamp comes in from the
/// outside so tests can pin the clock and the normalizer stays a pure function
/// of its arguments.
///
/// # Contract 📜
/// - Total: never fails, never panics, whatever the cell types.
/// - Deterministic for a given `(row, ingested_at)`.
pub(crate) trait RowTransform {
    fn transform_row(row: &RawRow, ingested_at: i64) -> ProductRecord;
}

/// ⏱️ Current wall clock as unix seconds.
///
/// A clock before 1970 is not a clock we negotiate with; it reads as 0.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since_the_dawn_of_time| since_the_dawn_of_time.as_secs() as i64)
        .unwrap_or(0)
}

/// 🚀 Normalize a row, stamping `ingested_at` with the current time.
pub fn normalize(row: &RawRow) -> ProductRecord {
    normalize_at(row, unix_now())
}

/// 🎯 Normalize a row with an explicit `ingested_at`. Same row + same stamp = same record.
pub fn normalize_at(row: &RawRow, ingested_at: i64) -> ProductRecord {
    SampleCsvProduct::transform_row(row, ingested_at)
}
