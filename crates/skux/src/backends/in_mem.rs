//! # Previously, on Skux...
//!
//! 🎬 The products were trapped in a CSV. MongoDB was three time zones away
//! and not answering. S3 wanted credentials nobody had. Someone had to play
//! every part in the pipeline without leaving the process.
//!
//! That someone was this module.
//!
//! `in_mem` provides in-memory stand-ins for every collaborator:
//! - [`InMemorySource`] hands out a Vec of rows, page by page.
//! - [`InMemoryArchive`] pretends to upload, remembers what it was asked to do.
//! - [`InMemoryCollection`] does a convincing MongoDB impression: set-on-conflict
//!   keyed by `product_id`, matched/modified/upserted accounting, ordered vs
//!   unordered failure behavior, and injectable failures for the tests that
//!   need the universe to be cruel on cue.
//!
//! The source and the archive only exist in test builds; the collection
//! also serves as the `in_memory` dry-run sink.
//!
//! All shared state sits behind `Arc<tokio::sync::Mutex<...>>` so tests can
//! keep a clone and peek after the pipeline has taken ownership.
//!
//! 🦆
//!
//! ⚠️ The collection doubles as the `in_memory` dry-run sink. It is NOT a database.
//! If you're deploying this to prod as your system of record, please also deploy a therapist.

use std::collections::{BTreeMap, HashSet};
#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::path::Path;
use std::sync::Arc;

#[cfg(test)]
use anyhow::Context;
use anyhow::{Result, bail};
use async_trait::async_trait;
use mongodb::bson::Document;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backends::Collection;
#[cfg(test)]
use crate::backends::{Archive, ArchiveReceipt, Source};
#[cfg(test)]
use crate::common::RawRow;
use crate::common::{BulkWriteOutcome, IDENTITY_FIELD, WriteFailure};
use crate::composers::UpsertOne;

// ===== Source =====

/// 📦 A source that serves pre-baked rows, `page_size` at a time.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct InMemorySource {
    rows: VecDeque<RawRow>,
    page_size: usize,
}

#[cfg(test)]
impl InMemorySource {
    pub(crate) fn new(rows: Vec<RawRow>, page_size: usize) -> Self {
        Self {
            rows: rows.into(),
            page_size: page_size.max(1),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Source for InMemorySource {
    async fn next_page(&mut self) -> Result<Option<Vec<RawRow>>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        let take = self.page_size.min(self.rows.len());
        Ok(Some(self.rows.drain(..take).collect()))
    }
}

// ===== Archive =====

/// 🪣 An archive that remembers every upload request and moves zero bytes over the network.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct InMemoryArchive {
    pub(crate) bucket: String,
    pub(crate) uploads: Arc<Mutex<Vec<ArchiveReceipt>>>,
}

#[cfg(test)]
impl InMemoryArchive {
    pub(crate) fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            uploads: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Archive for InMemoryArchive {
    async fn upload(&mut self, local_path: &Path, key: &str) -> Result<ArchiveReceipt> {
        // -- 📏 still touch the file, so a vanished input fails here like it would against S3
        let the_metadata = tokio::fs::metadata(local_path).await.context(format!(
            "💀 Can't archive '{}': the file is not there to be archived.",
            local_path.display()
        ))?;
        let the_receipt = ArchiveReceipt {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            bytes: the_metadata.len(),
        };
        self.uploads.lock().await.push(the_receipt.clone());
        Ok(the_receipt)
    }
}

// ===== Collection =====

/// 📞 One recorded `bulk_write` call: which ids, in which order, ordered or not.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) struct BulkCall {
    pub(crate) product_ids: Vec<String>,
    pub(crate) ordered: bool,
}

/// 🧠 The whole fake database, plus the knobs that make it misbehave.
#[derive(Debug, Default)]
pub(crate) struct InMemoryState {
    /// 📚 product_id → stored document. The map key *is* the unique index.
    pub(crate) documents: BTreeMap<String, Document>,
    pub(crate) unique_indexes: Vec<String>,
    pub(crate) bulk_calls: Vec<BulkCall>,
    /// 💥 make `ensure_unique_index` fail
    pub(crate) fail_index_creation: bool,
    /// 💥 make the n-th (0-based) `bulk_write` call fail as a whole
    pub(crate) fail_on_call: Option<usize>,
    /// 💥 reject individual ops for these ids with a per-op write error
    pub(crate) rejected_ids: HashSet<String>,
}

/// 🍃 A HashMap wearing a MongoDB costume. The costume is pretty good.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCollection {
    pub(crate) state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📸 Copy of everything stored so far.
    pub async fn documents(&self) -> BTreeMap<String, Document> {
        self.state.lock().await.documents.clone()
    }
}

#[async_trait]
impl Collection for InMemoryCollection {
    async fn ensure_unique_index(&mut self, field: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_index_creation {
            bail!(
                "💀 Index '{field}' already exists with different options. Somebody got here first and had opinions."
            );
        }
        if !state.unique_indexes.iter().any(|f| f == field) {
            state.unique_indexes.push(field.to_string());
        }
        Ok(())
    }

    async fn bulk_write(&mut self, ops: Vec<UpsertOne>, ordered: bool) -> Result<BulkWriteOutcome> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let call_number = state.bulk_calls.len();
        state.bulk_calls.push(BulkCall {
            product_ids: ops.iter().map(|op| op.product_id.clone()).collect(),
            ordered,
        });
        if state.fail_on_call == Some(call_number) {
            bail!("💀 connection reset by peer during bulk write #{call_number}. The fake network is very method.");
        }

        let mut outcome = BulkWriteOutcome::default();
        for (index, op) in ops.into_iter().enumerate() {
            if state.rejected_ids.contains(&op.product_id) {
                outcome.write_errors.push(WriteFailure {
                    index,
                    code: 121,
                    message: format!("Document failed validation for {}", op.product_id),
                });
                if ordered {
                    // -- 🛑 ordered mode: first failure ends the batch
                    break;
                }
                continue;
            }

            match state.documents.get_mut(&op.product_id) {
                Some(the_existing) => {
                    outcome.matched += 1;
                    let mut the_updated = the_existing.clone();
                    for (field, value) in op.set {
                        the_updated.insert(field, value);
                    }
                    if the_updated != *the_existing {
                        *the_existing = the_updated;
                        outcome.modified += 1;
                    }
                }
                None => {
                    let mut the_newborn = Document::new();
                    the_newborn.insert(IDENTITY_FIELD, op.product_id.clone());
                    for (field, value) in op.set.into_iter().chain(op.set_on_insert) {
                        the_newborn.insert(field, value);
                    }
                    state.documents.insert(op.product_id, the_newborn);
                    outcome.upserted += 1;
                }
            }
        }

        debug!(
            "🍃 in-memory bulk write #{}: matched={} modified={} upserted={} errors={}",
            call_number,
            outcome.matched,
            outcome.modified,
            outcome.upserted,
            outcome.write_errors.len()
        );
        Ok(outcome)
    }
}
