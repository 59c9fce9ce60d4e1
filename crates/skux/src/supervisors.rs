// ai
//! 🎬 *[camera pans across a CSV on a laptop. 3,000 rows. One of them has no product_id.]*
//! 🎬 "In a world where catalogues drift..."
//! 🎬 "One supervisor dared to keep them in sync."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor runs one ingestion, start to finish, on one thread,
//! in a fixed order:
//!
//! ```text
//!   input exists? ─▶ archive raw file (if bucket) ─▶ load every row
//!        ─▶ normalize ─▶ connect collection ─▶ batch upsert ─▶ IngestReport
//! ```
//!
//! Any stage failing ends the run with an error. The only soft spots are a
//! missing bucket (archival skipped, warned), a unique index that won't
//! build (warned), and per-op write errors when `tolerate_write_errors` is on.
//!
//! ⚠️ The upserter is the supervisor's business. It is not pub. It never was.

pub mod config;
pub(crate) mod upserter;

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::app_config::AppConfig;
use crate::backends::s3::archive_key;
use crate::backends::{
    Archive, ArchiveBackend, CollectionBackend, CsvSource, S3Archive, Source, SourceBackend,
};
use crate::common::{IngestReport, ProductRecord, RawRow};
use crate::progress::ProgressMetrics;
use crate::transforms::{normalize, unix_now};
use upserter::BatchUpserter;

/// 🧺 Everything loaded and normalized, waiting for a collection.
#[derive(Debug)]
pub(crate) struct Staged {
    rows_loaded: u64,
    rows_skipped: u64,
    archive_key: Option<String>,
    records: Vec<ProductRecord>,
}

/// 📦 Owns the config for one run and walks it through the pipeline.
pub(crate) struct Supervisor {
    app_config: AppConfig,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🚀 Build the real collaborators from config, then ingest.
    pub(crate) async fn run(&self) -> Result<IngestReport> {
        let the_csv_path = self.app_config.csv.path.as_path();
        // -- 🔒 no input, no run. Nothing gets connected, archived, or written.
        let it_exists = the_csv_path.try_exists().context(format!(
            "💀 Couldn't even check whether '{}' exists. Permissions? A haunted mount?",
            the_csv_path.display()
        ))?;
        if !it_exists {
            bail!(
                "💀 CSV not found: {}. Check CSV_PATH, or --csv-path, or the pwd you launched from.",
                the_csv_path.display()
            );
        }

        let mut the_archive = match self.app_config.archive.bucket() {
            Some(bucket) => Some(ArchiveBackend::S3(
                S3Archive::new(&self.app_config.archive, bucket).await?,
            )),
            None => {
                warn!("⚠️ AWS_S3_BUCKET not set, skipping S3 backup");
                None
            }
        };

        let mut the_source = SourceBackend::Csv(CsvSource::open(self.app_config.csv.clone())?);

        let the_staged = self.stage(&mut the_source, the_archive.as_mut()).await?;
        let mut the_collection = CollectionBackend::from_config(&self.app_config.sink_config).await?;
        self.deliver(the_staged, &mut the_collection).await
    }

    /// 📥 Archive the raw file, load every row, normalize, drop the unkeyable.
    #[instrument(name = "stage", skip_all, fields(csv = %self.app_config.csv.path.display()))]
    pub(crate) async fn stage(
        &self,
        source: &mut SourceBackend,
        archive: Option<&mut ArchiveBackend>,
    ) -> Result<Staged> {
        let the_csv_path = self.app_config.csv.path.as_path();

        // 🪣 raw backup, before a single row is touched
        let archive_key = match archive {
            Some(the_archive) => Some(self.back_up(the_archive, the_csv_path).await?),
            None => None,
        };

        // 📥 the whole table, into memory
        let the_rows = drain(source).await?;
        info!("📥 Loaded {} rows from {}", the_rows.len(), the_csv_path.display());

        let mut rows_skipped = 0_u64;
        let mut records = Vec::with_capacity(the_rows.len());
        for (row_number, row) in the_rows.iter().enumerate() {
            let the_record = normalize(row);
            if the_record.product_id.is_empty() {
                rows_skipped += 1;
                // -- 📏 +2: one for the header, one because humans count from 1
                warn!("⚠️ Row {} has no product_id, skipping", row_number + 2);
                continue;
            }
            records.push(the_record);
        }

        Ok(Staged {
            rows_loaded: the_rows.len() as u64,
            rows_skipped,
            archive_key,
            records,
        })
    }

    /// 🍃 Batch-upsert the staged records and write up the report.
    #[instrument(name = "deliver", skip_all, fields(records = staged.records.len()))]
    pub(crate) async fn deliver(
        &self,
        staged: Staged,
        collection: &mut CollectionBackend,
    ) -> Result<IngestReport> {
        let runtime = &self.app_config.runtime;
        let the_label = self.app_config.csv.path.display().to_string();
        let the_total = staged.records.len() as u64;
        let the_progress = if runtime.progress {
            ProgressMetrics::new(the_label.clone(), the_total)
        } else {
            ProgressMetrics::hidden(the_label.clone(), the_total)
        };
        let totals = BatchUpserter::new(runtime.batch_size, runtime.ingested_at_policy)?
            .with_progress(the_progress)
            .upsert_all(staged.records, collection)
            .await?;

        info!("✅ Ingestion complete. Upserted/updated: {}", totals.changed());

        if totals.write_errors > 0 {
            if runtime.tolerate_write_errors {
                warn!(
                    "⚠️ {} upsert(s) were rejected by the server; runtime.tolerate_write_errors is on, carrying on",
                    totals.write_errors
                );
            } else {
                bail!(
                    "💀 {} upsert(s) were rejected by the server ({} documents did change). \
                     Set runtime.tolerate_write_errors = true to accept partial runs.",
                    totals.write_errors,
                    totals.changed()
                );
            }
        }

        Ok(IngestReport {
            csv_path: the_label,
            rows_loaded: staged.rows_loaded,
            rows_skipped: staged.rows_skipped,
            archive_key: staged.archive_key,
            totals,
        })
    }

    async fn back_up(&self, archive: &mut ArchiveBackend, csv_path: &Path) -> Result<String> {
        let the_key = archive_key(&self.app_config.archive.key_prefix, unix_now(), csv_path);
        let the_receipt = archive
            .upload(csv_path, &the_key)
            .await
            .context("💀 Raw backup failed, so nothing was ingested. The backup comes first or nothing does.")?;
        info!(
            "🪣 Backed up raw to {} ({} bytes)",
            the_receipt.uri(),
            the_receipt.bytes
        );
        Ok(the_receipt.key)
    }
}

async fn drain(source: &mut SourceBackend) -> Result<Vec<RawRow>> {
    let mut the_rows = Vec::new();
    while let Some(page) = source.next_page().await? {
        the_rows.extend(page);
    }
    Ok(the_rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{
        CsvSourceConfig, InMemoryArchive, InMemoryCollection, InMemorySource, SinkConfig,
    };
    use crate::supervisors::config::RuntimeConfig;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const THE_SAMPLE: &str = "\
product_id,name,brand,category,price,currency,stock
A,Widget,Acme,Tools,9.99,EUR,5
B,Gadget,Acme,Tools,,,
A,Widget,Acme,Tools,10.99,EUR,4
";

    fn a_csv(contents: &str) -> NamedTempFile {
        let mut the_file = NamedTempFile::new().expect("💀 tempfile should be creatable");
        the_file
            .write_all(contents.as_bytes())
            .expect("💀 tempfile should be writable");
        the_file
    }

    fn a_config(csv_path: &Path, batch_size: usize) -> AppConfig {
        AppConfig {
            csv: CsvSourceConfig {
                path: csv_path.to_path_buf(),
                ..CsvSourceConfig::default()
            },
            sink_config: SinkConfig::InMemory,
            runtime: RuntimeConfig {
                batch_size,
                progress: false,
                ..RuntimeConfig::default()
            },
            ..AppConfig::default()
        }
    }

    impl Supervisor {
        async fn ingest(
            &self,
            source: &mut SourceBackend,
            archive: Option<&mut ArchiveBackend>,
            collection: &mut CollectionBackend,
        ) -> Result<IngestReport> {
            let the_staged = self.stage(source, archive).await?;
            self.deliver(the_staged, collection).await
        }
    }

    fn csv_source(config: &AppConfig) -> SourceBackend {
        SourceBackend::Csv(CsvSource::open(config.csv.clone()).expect("💀 CSV should open"))
    }

    #[tokio::test]
    async fn the_one_where_duplicates_resolve_to_the_last_row() -> Result<()> {
        let the_file = a_csv(THE_SAMPLE);
        let the_config = a_config(the_file.path(), 2);
        let the_collection = InMemoryCollection::new();
        let mut the_sink = CollectionBackend::InMemory(the_collection.clone());

        let the_report = Supervisor::new(the_config.clone())
            .ingest(&mut csv_source(&the_config), None, &mut the_sink)
            .await?;

        assert_eq!(the_report.rows_loaded, 3);
        assert_eq!(the_report.rows_skipped, 0);
        assert_eq!(the_report.totals.batches, 2);
        assert!(the_report.archive_key.is_none());

        let the_docs = the_collection.documents().await;
        assert_eq!(the_docs.len(), 2);
        assert_eq!(the_docs["A"].get_f64("price")?, 10.99);
        assert_eq!(the_docs["A"].get_i64("stock")?, 4);
        // 🪹 B's blanks fell back to the defaults
        assert_eq!(the_docs["B"].get_f64("price")?, 0.0);
        assert_eq!(the_docs["B"].get_str("currency")?, "USD");
        assert_eq!(the_docs["B"].get_str("source")?, "sample_csv");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_raw_file_is_backed_up_first() -> Result<()> {
        let the_file = a_csv(THE_SAMPLE);
        let the_config = a_config(the_file.path(), 100);
        let the_archive = InMemoryArchive::new("raw-backups");
        let mut the_archive_backend = ArchiveBackend::InMemory(the_archive.clone());
        let mut the_sink = CollectionBackend::InMemory(InMemoryCollection::new());

        let the_report = Supervisor::new(the_config.clone())
            .ingest(
                &mut csv_source(&the_config),
                Some(&mut the_archive_backend),
                &mut the_sink,
            )
            .await?;

        let the_uploads = the_archive.uploads.lock().await;
        assert_eq!(the_uploads.len(), 1);
        assert_eq!(the_uploads[0].bytes, THE_SAMPLE.len() as u64);
        let the_key = the_report.archive_key.expect("💀 an archive key should be reported");
        assert!(the_key.starts_with("raw/products/"));
        let the_file_name = the_file
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        assert!(the_key.ends_with(&format!("_{the_file_name}")));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_failed_backup_stops_everything() {
        let the_file = a_csv(THE_SAMPLE);
        let mut the_config = a_config(the_file.path(), 100);
        let mut the_source = csv_source(&the_config);
        // -- 🪦 the file vanishes between open and archive
        the_config.csv.path = the_file.path().with_extension("gone");
        let the_collection = InMemoryCollection::new();
        let mut the_sink = CollectionBackend::InMemory(the_collection.clone());
        let mut the_archive = ArchiveBackend::InMemory(InMemoryArchive::new("raw-backups"));

        let the_result = Supervisor::new(the_config)
            .ingest(&mut the_source, Some(&mut the_archive), &mut the_sink)
            .await;

        assert!(the_result.is_err());
        assert!(the_collection.state.lock().await.bulk_calls.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_rows_without_ids_are_skipped() -> Result<()> {
        let the_file = a_csv("product_id,name,price\n,Nameless,1.00\n  ,Blank,2.00\nC,Real,3.00\n");
        let the_config = a_config(the_file.path(), 100);
        let the_collection = InMemoryCollection::new();
        let mut the_sink = CollectionBackend::InMemory(the_collection.clone());

        let the_report = Supervisor::new(the_config.clone())
            .ingest(&mut csv_source(&the_config), None, &mut the_sink)
            .await?;

        assert_eq!(the_report.rows_loaded, 3);
        assert_eq!(the_report.rows_skipped, 2);
        assert_eq!(the_report.totals.upserted, 1);
        assert_eq!(the_collection.documents().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_table_is_a_quiet_success() -> Result<()> {
        let the_file = a_csv("product_id,name,price\n");
        let the_config = a_config(the_file.path(), 100);
        let the_collection = InMemoryCollection::new();
        let mut the_sink = CollectionBackend::InMemory(the_collection.clone());

        let the_report = Supervisor::new(the_config.clone())
            .ingest(&mut csv_source(&the_config), None, &mut the_sink)
            .await?;

        assert_eq!(the_report.rows_loaded, 0);
        assert_eq!(the_report.totals.changed(), 0);
        assert!(the_collection.state.lock().await.bulk_calls.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_rejected_writes_fail_the_run_unless_tolerated() -> Result<()> {
        let the_file = a_csv(THE_SAMPLE);
        let mut the_config = a_config(the_file.path(), 100);
        let the_collection = InMemoryCollection::new();
        the_collection
            .state
            .lock()
            .await
            .rejected_ids
            .insert("B".to_string());

        let mut the_sink = CollectionBackend::InMemory(the_collection.clone());
        let the_strict_result = Supervisor::new(the_config.clone())
            .ingest(&mut csv_source(&the_config), None, &mut the_sink)
            .await;
        assert!(the_strict_result.is_err());
        // -- 📦 the siblings still landed
        assert!(the_collection.documents().await.contains_key("A"));

        the_config.runtime.tolerate_write_errors = true;
        let the_report = Supervisor::new(the_config.clone())
            .ingest(&mut csv_source(&the_config), None, &mut the_sink)
            .await?;
        assert_eq!(the_report.totals.write_errors, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_typed_cells_from_memory_normalize_too() -> Result<()> {
        let serde_json::Value::Object(the_row) = serde_json::json!({
            "product_id": 42,
            "name": "Answer",
            "price": 4.5,
            "stock": true,
        }) else {
            panic!("💀 json! stopped making objects.");
        };
        let the_config = a_config(Path::new("in-memory"), 100);
        let mut the_source = SourceBackend::InMemory(InMemorySource::new(vec![the_row], 10));
        let the_collection = InMemoryCollection::new();
        let mut the_sink = CollectionBackend::InMemory(the_collection.clone());

        let the_report = Supervisor::new(the_config)
            .ingest(&mut the_source, None, &mut the_sink)
            .await?;

        assert_eq!(the_report.totals.upserted, 1);
        let the_docs = the_collection.documents().await;
        assert_eq!(the_docs["42"].get_f64("price")?, 4.5);
        assert_eq!(the_docs["42"].get_i64("stock")?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_csv_ends_the_run_before_it_starts() {
        let the_dir = tempfile::tempdir().expect("💀 tempdir should be creatable");
        let the_config = a_config(&the_dir.path().join("nope.csv"), 100);

        let the_error = Supervisor::new(the_config)
            .run()
            .await
            .expect_err("💀 a missing CSV must fail");
        assert!(the_error.to_string().contains("CSV not found"));
    }

    #[tokio::test]
    async fn the_one_where_a_dry_run_goes_end_to_end() -> Result<()> {
        // -- 🪣 no bucket configured → backup skipped; in_memory sink → nothing leaves the process
        let the_file = a_csv(THE_SAMPLE);
        let the_config = a_config(the_file.path(), 2);

        let the_report = Supervisor::new(the_config).run().await?;

        assert_eq!(the_report.rows_loaded, 3);
        assert!(the_report.archive_key.is_none());
        assert_eq!(the_report.totals.upserted, 2);
        assert_eq!(the_report.totals.changed(), 3);
        Ok(())
    }
}
