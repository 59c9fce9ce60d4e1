//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Sources pour rows, Archives stash raw files, Collections swallow upserts.
//! And in between, we panic! (kidding, we use anyhow)
//!
//! 🎭 This module is the casting agency. Need rows from a CSV on disk? From a
//! Vec in a test? Need a backup in S3, or just a note that says "I would have
//! uploaded this"? Need MongoDB, or a HashMap doing a convincing MongoDB
//! impression? We've got a backend for that.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls → `*Backend` enum dispatcher → `from_config` resolver
//! - `Source`     → `CsvSource`, `InMemorySource` (tests) → `SourceBackend`
//! - `Archive`    → `S3Archive`, `InMemoryArchive` (tests) → `ArchiveBackend`
//! - `Collection` → `MongoCollection`, `InMemoryCollection` → `CollectionBackend`
//! - Configs live co-located with the backend that reads them.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::common::{BulkWriteOutcome, RawRow};
use crate::composers::UpsertOne;

pub(crate) mod csv_file;
pub(crate) mod in_mem;
pub(crate) mod mongo;
pub(crate) mod s3;

pub use csv_file::CsvSourceConfig;
pub use mongo::MongoSinkConfig;
pub use s3::ArchiveConfig;

pub(crate) use csv_file::CsvSource;
pub use in_mem::InMemoryCollection;
#[cfg(test)]
pub(crate) use in_mem::{InMemoryArchive, InMemorySource};
pub(crate) use mongo::MongoCollection;
pub(crate) use s3::S3Archive;

// ===== Source =====

/// 🚰 A tabular reader: rows in file order, one page per call.
///
/// # Contract 📜
/// - `Ok(Some(rows))` while rows flow; pages are never empty.
/// - `Ok(None)` at EOF. The well is dry. 🏁
/// - `Err(...)` when the file turns out to be a JPEG in a CSV trenchcoat.
#[async_trait]
pub(crate) trait Source: std::fmt::Debug + Send {
    async fn next_page(&mut self) -> Result<Option<Vec<RawRow>>>;
}

/// 🎭 The many faces of a Source.
#[derive(Debug)]
pub(crate) enum SourceBackend {
    Csv(CsvSource),
    #[cfg(test)]
    InMemory(InMemorySource),
}

#[async_trait]
impl Source for SourceBackend {
    async fn next_page(&mut self) -> Result<Option<Vec<RawRow>>> {
        match self {
            SourceBackend::Csv(s) => s.next_page().await,
            #[cfg(test)]
            SourceBackend::InMemory(s) => s.next_page().await,
        }
    }
}

// ===== Archive =====

/// 🧾 Proof that the raw file made it somewhere safe.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveReceipt {
    pub bucket: String,
    pub key: String,
    pub bytes: u64,
}

impl ArchiveReceipt {
    /// 🔗 `s3://bucket/key`, for log lines and humans.
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// 🪣 An archival uploader: copies a local file to object storage under `key`.
///
/// No retries. A failed upload is the caller's problem, and the caller makes
/// it the whole run's problem.
#[async_trait]
pub(crate) trait Archive: std::fmt::Debug + Send {
    async fn upload(&mut self, local_path: &Path, key: &str) -> Result<ArchiveReceipt>;
}

/// 🎭 The many faces of an Archive.
#[derive(Debug)]
pub(crate) enum ArchiveBackend {
    S3(S3Archive),
    #[cfg(test)]
    InMemory(InMemoryArchive),
}

#[async_trait]
impl Archive for ArchiveBackend {
    async fn upload(&mut self, local_path: &Path, key: &str) -> Result<ArchiveReceipt> {
        match self {
            ArchiveBackend::S3(a) => a.upload(local_path, key).await,
            #[cfg(test)]
            ArchiveBackend::InMemory(a) => a.upload(local_path, key).await,
        }
    }
}

// ===== Collection =====

/// 🍃 A handle on a uniquely keyed document collection.
///
/// # Contract 📜
/// - `ensure_unique_index` is idempotent. Calling it on an existing identical
///   index is a no-op; a conflicting index is an error the caller may shrug off.
/// - `bulk_write` submits every op in one call. `ordered = false` means a
///   failing op does not stop its siblings; failures come back in
///   `BulkWriteOutcome::write_errors`. `Err(...)` means the call itself failed
///   (network, auth, server gone fishing).
#[async_trait]
pub trait Collection: std::fmt::Debug + Send {
    async fn ensure_unique_index(&mut self, field: &str) -> Result<()>;
    async fn bulk_write(&mut self, ops: Vec<UpsertOne>, ordered: bool) -> Result<BulkWriteOutcome>;
}

/// 🎭 The many faces of a Collection.
#[derive(Debug)]
pub(crate) enum CollectionBackend {
    Mongo(MongoCollection),
    InMemory(InMemoryCollection),
}

#[async_trait]
impl Collection for CollectionBackend {
    async fn ensure_unique_index(&mut self, field: &str) -> Result<()> {
        match self {
            CollectionBackend::Mongo(c) => c.ensure_unique_index(field).await,
            CollectionBackend::InMemory(c) => c.ensure_unique_index(field).await,
        }
    }

    async fn bulk_write(&mut self, ops: Vec<UpsertOne>, ordered: bool) -> Result<BulkWriteOutcome> {
        match self {
            CollectionBackend::Mongo(c) => c.bulk_write(ops, ordered).await,
            CollectionBackend::InMemory(c) => c.bulk_write(ops, ordered).await,
        }
    }
}

/// 🎯 Where do the upserts go?
///
/// `mongo` is the real thing. `in_memory` is a dry run: the full pipeline
/// runs, the HashMap takes the hit, and nothing leaves the process.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "snake_case")]
pub enum SinkConfig {
    Mongo(MongoSinkConfig),
    InMemory,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Mongo(MongoSinkConfig::default())
    }
}

impl CollectionBackend {
    /// 🔧 Resolve a sink config into a live collection handle.
    pub(crate) async fn from_config(config: &SinkConfig) -> Result<Self> {
        match config {
            SinkConfig::Mongo(mongo_config) => Ok(CollectionBackend::Mongo(
                MongoCollection::connect(mongo_config.clone()).await?,
            )),
            SinkConfig::InMemory => Ok(CollectionBackend::InMemory(InMemoryCollection::new())),
        }
    }
}
