//! 🛒 skux: product catalogue in, MongoDB out, raw file safely in S3.
//!
//! 🎬 *[narrator voice]* "It reads a CSV. It backs the CSV up. It normalizes
//! every row. It upserts them in batches keyed by `product_id`. Then it goes
//! home." 🦆
//!
//! The library surface is small on purpose: build an [`AppConfig`]
//! (usually via [`app_config::load_config`]), hand it to [`run`], get an
//! [`IngestReport`] back. The normalizer and the batch upserter are public
//! too, for anyone bringing their own [`Collection`].

pub mod app_config;
mod backends;
mod common;
mod composers;
mod progress;
mod supervisors;
mod transforms;

use anyhow::Result;

pub use app_config::{AppConfig, Overrides, load_config};
pub use backends::{
    ArchiveConfig, ArchiveReceipt, Collection, CsvSourceConfig, InMemoryCollection,
    MongoSinkConfig, SinkConfig,
};
pub use common::{
    BulkWriteOutcome, IDENTITY_FIELD, IngestReport, ProductRecord, RawRow, SOURCE_TAG,
    UpsertTotals, WriteFailure,
};
pub use composers::{IngestedAtPolicy, UpsertOne};
pub use supervisors::config::RuntimeConfig;
pub use supervisors::upserter::{DEFAULT_BATCH_SIZE, upsert_all};
pub use transforms::{normalize, normalize_at, unix_now};

use supervisors::Supervisor;

/// 🚀 Run one ingestion end to end.
///
/// The config is validated first, so a missing Mongo URI or a zero batch
/// size fails before any file, bucket, or server is touched.
pub async fn run(app_config: AppConfig) -> Result<IngestReport> {
    app_config.validate()?;
    Supervisor::new(app_config).run().await
}
