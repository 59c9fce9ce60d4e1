// ai
//! 🎬 *[a Vec fills with products. somewhere, a collection waits.]*
//! *[the clock on the wall reads 2:47am.]*
//! *[nobody asked for this catalogue refresh. and yet, here we are.]*
//!
//! 🗑️ The BatchUpserter: deeply unbothered by the chaos
//! happening upstream. It receives records. It buffers them. When the buffer
//! hits `batch_size` it composes one upsert per record and sends the whole
//! lot as a single **unordered** bulk write. At end-of-stream it flushes
//! whatever is left. It counts what changed. It asks no questions.
//!
//! 🧠 Knowledge graph:
//! - `ensure_unique_index("product_id")` first; failure is a warning, not a stop
//! - records → buffer(batch_size) → `UpsertComposer::compose` → `Collection::bulk_write(ops, ordered = false)`
//! - exactly `ceil(N / batch_size)` bulk writes, input order kept within and across batches
//! - totals: `modified + upserted` is the headline; matched-but-unchanged is not a change
//! - a bulk write that fails as a whole ends the run; earlier batches stay committed
//! - per-op `write_errors` are logged and counted; siblings still land
//!
//! 🦆 (the duck has no comment at this time)

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::backends::Collection;
use crate::common::{BulkWriteOutcome, IDENTITY_FIELD, ProductRecord, UpsertTotals};
use crate::composers::{IngestedAtPolicy, UpsertComposer};
use crate::progress::ProgressMetrics;

/// 📦 The default batch bound.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// 🗑️ Buffers records and flushes them as unordered bulk upserts.
#[derive(Debug)]
pub(crate) struct BatchUpserter {
    batch_size: usize,
    composer: UpsertComposer,
    progress: Option<ProgressMetrics>,
}

impl BatchUpserter {
    /// 🏗️ A batch size of zero would never flush. We refuse it up front.
    pub(crate) fn new(batch_size: usize, policy: IngestedAtPolicy) -> Result<Self> {
        if batch_size == 0 {
            bail!("💀 batch_size must be at least 1. A batch of nothing, flushed forever, is a very expensive no-op.");
        }
        Ok(Self {
            batch_size,
            composer: UpsertComposer::new(policy),
            progress: None,
        })
    }

    pub(crate) fn with_progress(mut self, progress: ProgressMetrics) -> Self {
        self.progress = Some(progress);
        self
    }

    /// 🚀 Upsert every record, batch by batch, and return the totals.
    pub(crate) async fn upsert_all<I, C>(&mut self, records: I, collection: &mut C) -> Result<UpsertTotals>
    where
        I: IntoIterator<Item = ProductRecord>,
        C: Collection + ?Sized,
    {
        // -- 🔑 the unique index is nice to have, not a reason to stop
        if let Err(err) = collection.ensure_unique_index(IDENTITY_FIELD).await {
            warn!("⚠️ Index creation warning: {:#}", err);
        }

        let mut totals = UpsertTotals::default();
        let mut batch: Vec<ProductRecord> = Vec::with_capacity(self.batch_size);

        for record in records {
            batch.push(record);
            if batch.len() >= self.batch_size {
                self.flush(&mut batch, collection, &mut totals, false).await?;
            }
        }
        // -- 🏁 end of stream: the short remainder still gets its bulk write
        if !batch.is_empty() {
            self.flush(&mut batch, collection, &mut totals, true).await?;
        }

        if let Some(ref progress) = self.progress {
            progress.finish();
        }
        Ok(totals)
    }

    async fn flush<C>(
        &mut self,
        batch: &mut Vec<ProductRecord>,
        collection: &mut C,
        totals: &mut UpsertTotals,
        is_final: bool,
    ) -> Result<()>
    where
        C: Collection + ?Sized,
    {
        let the_ops = self.composer.compose(batch)?;
        let the_ids: Vec<String> = batch.drain(..).map(|r| r.product_id).collect();
        let batch_number = totals.batches + 1;

        let outcome: BulkWriteOutcome = collection
            .bulk_write(the_ops, false)
            .await
            .context(format!(
                "💀 Bulk write #{} ({} products) failed as a whole. {} earlier batch(es) are already committed.",
                batch_number,
                the_ids.len(),
                totals.batches
            ))?;

        for failure in &outcome.write_errors {
            warn!(
                "⚠️ Upsert rejected for product '{}' (code {}): {}",
                the_ids.get(failure.index).map(String::as_str).unwrap_or("?"),
                failure.code,
                failure.message
            );
        }

        info!(
            "📦 Upserted {}batch #{} -> matched={}, modified={}, upserted={}",
            if is_final { "final " } else { "" },
            batch_number,
            outcome.matched,
            outcome.modified,
            outcome.upserted
        );

        totals.absorb(&outcome);
        if let Some(ref mut progress) = self.progress {
            progress.update(the_ids.len() as u64, outcome.modified + outcome.upserted);
        }
        Ok(())
    }
}

/// 🎯 Upsert `records` into `collection` in unordered batches of `batch_size`.
///
/// Returns the run totals; `totals.changed()` is the number of documents
/// created or actually modified.
pub async fn upsert_all<I, C>(records: I, collection: &mut C, batch_size: usize) -> Result<UpsertTotals>
where
    I: IntoIterator<Item = ProductRecord>,
    C: Collection + ?Sized,
{
    BatchUpserter::new(batch_size, IngestedAtPolicy::default())?
        .upsert_all(records, collection)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryCollection;
    use crate::transforms::normalize_at;
    use serde_json::json;

    fn record(id: &str, price: f64, ingested_at: i64) -> ProductRecord {
        let serde_json::Value::Object(the_row) =
            json!({ "product_id": id, "price": price.to_string(), "stock": "1" })
        else {
            panic!("💀 json! stopped making objects.");
        };
        normalize_at(&the_row, ingested_at)
    }

    fn records(n: usize) -> Vec<ProductRecord> {
        (0..n).map(|i| record(&format!("P{i:04}"), i as f64, 1)).collect()
    }

    #[tokio::test]
    async fn the_one_where_batches_partition_the_input_exactly() -> Result<()> {
        for (n, batch_size, expected_calls) in
            [(0, 100, 0), (1, 100, 1), (100, 100, 1), (101, 100, 2), (250, 100, 3), (7, 1, 7)]
        {
            let mut the_collection = InMemoryCollection::new();
            let the_records = records(n);
            let the_expected_ids: Vec<String> =
                the_records.iter().map(|r| r.product_id.clone()).collect();

            let totals = upsert_all(the_records, &mut the_collection, batch_size).await?;

            let state = the_collection.state.lock().await;
            assert_eq!(state.bulk_calls.len(), expected_calls, "N={n}, B={batch_size}");
            assert_eq!(totals.batches as usize, expected_calls);
            let the_seen_ids: Vec<String> =
                state.bulk_calls.iter().flat_map(|c| c.product_ids.clone()).collect();
            assert_eq!(the_seen_ids, the_expected_ids, "every record once, in order");
            assert!(state.bulk_calls.iter().all(|c| c.product_ids.len() <= batch_size));
            assert!(state.bulk_calls.iter().all(|c| !c.ordered), "always unordered");
            assert_eq!(totals.changed() as usize, n);
        }
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_unique_index_is_ensured_first() -> Result<()> {
        let mut the_collection = InMemoryCollection::new();
        upsert_all(records(3), &mut the_collection, 2).await?;
        assert_eq!(
            the_collection.state.lock().await.unique_indexes,
            vec!["product_id"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_index_trouble_is_only_a_warning() -> Result<()> {
        let mut the_collection = InMemoryCollection::new();
        the_collection.state.lock().await.fail_index_creation = true;

        let totals = upsert_all(records(5), &mut the_collection, 2).await?;

        assert_eq!(totals.changed(), 5);
        assert_eq!(the_collection.documents().await.len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_dead_batch_kills_the_run_but_not_the_past() {
        let mut the_collection = InMemoryCollection::new();
        the_collection.state.lock().await.fail_on_call = Some(1);

        let the_result = upsert_all(records(5), &mut the_collection, 2).await;

        assert!(the_result.is_err());
        // 🪦 batch #1 landed before batch #2 took the network down with it
        let the_docs = the_collection.documents().await;
        assert_eq!(the_docs.len(), 2);
        assert!(the_docs.contains_key("P0000") && the_docs.contains_key("P0001"));
        // 🛑 nothing after the failure was attempted
        assert_eq!(the_collection.state.lock().await.bulk_calls.len(), 2);
    }

    #[tokio::test]
    async fn the_one_where_a_rejected_op_does_not_sink_its_siblings() -> Result<()> {
        let mut the_collection = InMemoryCollection::new();
        the_collection
            .state
            .lock()
            .await
            .rejected_ids
            .insert("P0001".to_string());

        let totals = upsert_all(records(4), &mut the_collection, 4).await?;

        assert_eq!(totals.write_errors, 1);
        assert_eq!(totals.upserted, 3);
        assert!(the_collection.documents().await.contains_key("P0002"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_duplicates_collapse_and_the_last_write_wins() -> Result<()> {
        let mut the_collection = InMemoryCollection::new();
        let the_records = vec![record("A", 9.99, 1), record("B", 0.0, 1), record("A", 10.99, 1)];

        let totals = upsert_all(the_records, &mut the_collection, 2).await?;

        let state = the_collection.state.lock().await;
        assert_eq!(
            state.bulk_calls.iter().map(|c| c.product_ids.clone()).collect::<Vec<_>>(),
            vec![vec!["A".to_string(), "B".to_string()], vec!["A".to_string()]]
        );
        assert_eq!(state.documents.len(), 2);
        assert_eq!(state.documents["A"].get_f64("price")?, 10.99);
        assert_eq!((totals.upserted, totals.modified), (2, 1));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_every_run_restamps_and_first_seen_stays_quiet() -> Result<()> {
        // ⏱️ every_run: identical content, new clock → every doc counts as modified
        let mut the_collection = InMemoryCollection::new();
        let mut every_run = BatchUpserter::new(2, IngestedAtPolicy::EveryRun)?;
        let first = every_run.upsert_all(vec![record("A", 1.0, 100), record("B", 2.0, 100)], &mut the_collection).await?;
        let second = every_run.upsert_all(vec![record("A", 1.0, 200), record("B", 2.0, 200)], &mut the_collection).await?;
        assert_eq!(first.changed(), 2);
        assert_eq!((second.matched, second.modified, second.upserted), (2, 2, 0));

        // 🐣 first_seen: identical content, new clock → nothing changes, stamp keeps the birthday
        let mut the_quiet_collection = InMemoryCollection::new();
        let mut first_seen = BatchUpserter::new(2, IngestedAtPolicy::FirstSeen)?;
        first_seen.upsert_all(vec![record("A", 1.0, 100)], &mut the_quiet_collection).await?;
        let repeat = first_seen.upsert_all(vec![record("A", 1.0, 200)], &mut the_quiet_collection).await?;
        assert_eq!((repeat.matched, repeat.changed()), (1, 0));
        let the_docs = the_quiet_collection.documents().await;
        assert_eq!(the_docs["A"].get_i64("ingested_at")?, 100);

        // 🔁 but a real change is still a change
        let changed = first_seen.upsert_all(vec![record("A", 1.5, 300)], &mut the_quiet_collection).await?;
        assert_eq!(changed.modified, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_zero_batch_size_is_turned_away_at_the_door() {
        let mut the_collection = InMemoryCollection::new();
        assert!(upsert_all(records(3), &mut the_collection, 0).await.is_err());
        assert!(the_collection.state.lock().await.bulk_calls.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_progress_tags_along() -> Result<()> {
        let mut the_collection = InMemoryCollection::new();
        let mut the_upserter = BatchUpserter::new(2, IngestedAtPolicy::EveryRun)?
            .with_progress(ProgressMetrics::hidden("test".to_string(), 3));
        the_upserter.upsert_all(records(3), &mut the_collection).await?;
        assert_eq!(the_upserter.progress.as_ref().map(|p| p.rows_done()), Some(3));
        Ok(())
    }
}
