// ai
//! 🎬 *[the batch is full. the records wait. the collection hungers.]*
//! *["Compose me," whispers the record. "Make me an upsert."]*
//!
//! 🎼 The Composers module: turns a batch of [`ProductRecord`]s into the
//! set-on-conflict operations a [`Collection`](crate::backends::Collection)
//! understands.
//!
//! 🧠 Knowledge graph:
//! - **Input**: a slice of records (one batch, already bounded by `batch_size`)
//! - **Output**: one [`UpsertOne`] per record, same order
//! - **Filter**: `{product_id: <id>}`: the unique index does the rest
//! - **Update**: `$set` carries the full field set, so a match replaces every
//!   field. Under [`IngestedAtPolicy::FirstSeen`] the stamp moves to
//!   `$setOnInsert` and only ever lands once.
//!
//! ```text
//!   records ──▶ UpsertComposer::compose ──▶ Vec<UpsertOne> ──▶ collection.bulk_write
//! ```
//!
//! 🦆 (the duck composes... upserts? the duck has no comment.)

use anyhow::{Context, Result};
use mongodb::bson::{self, Document};
use serde::Deserialize;

use crate::common::ProductRecord;

/// ⏱️ Does `ingested_at` take part in change detection?
///
/// - `EveryRun`: the stamp rides in `$set`. A repeat run over identical rows
///   rewrites the stamp, so every matched document counts as modified.
/// - `FirstSeen`: the stamp rides in `$setOnInsert`. A repeat run over
///   identical rows changes nothing and reports zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestedAtPolicy {
    #[default]
    EveryRun,
    FirstSeen,
}

/// 🎯 One set-on-conflict write: match by `product_id`, replace-or-insert.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOne {
    pub product_id: String,
    /// 📦 fields written on every match and on insert
    pub set: Document,
    /// 🐣 fields written only when the op inserts; empty means "nothing extra"
    pub set_on_insert: Document,
}

impl UpsertOne {
    /// 🔍 The filter half of the op.
    pub fn filter(&self) -> Document {
        let mut the_filter = Document::new();
        the_filter.insert(crate::common::IDENTITY_FIELD, self.product_id.clone());
        the_filter
    }

    /// 🔄 The update half of the op, in MongoDB operator syntax.
    ///
    /// `$setOnInsert` is omitted when empty; the server rejects empty operators.
    pub fn update(&self) -> Document {
        let mut the_update = Document::new();
        the_update.insert("$set", self.set.clone());
        if !self.set_on_insert.is_empty() {
            the_update.insert("$setOnInsert", self.set_on_insert.clone());
        }
        the_update
    }
}

/// 🎼 Composes a batch of records into upsert operations.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UpsertComposer {
    pub(crate) policy: IngestedAtPolicy,
}

impl UpsertComposer {
    pub(crate) fn new(policy: IngestedAtPolicy) -> Self {
        Self { policy }
    }

    /// 🎼 One op per record, input order preserved.
    pub(crate) fn compose(&self, batch: &[ProductRecord]) -> Result<Vec<UpsertOne>> {
        batch.iter().map(|record| self.compose_one(record)).collect()
    }

    fn compose_one(&self, record: &ProductRecord) -> Result<UpsertOne> {
        let mut the_fields = bson::to_document(record).context(format!(
            "💀 Product '{}' refused to become BSON. It was a perfectly good struct five minutes ago.",
            record.product_id
        ))?;

        let mut set_on_insert = Document::new();
        if self.policy == IngestedAtPolicy::FirstSeen {
            // -- 🐣 the stamp only lands on birth
            if let Some(the_stamp) = the_fields.remove("ingested_at") {
                set_on_insert.insert("ingested_at", the_stamp);
            }
        }

        Ok(UpsertOne {
            product_id: record.product_id.clone(),
            set: the_fields,
            set_on_insert,
        })
    }
}
