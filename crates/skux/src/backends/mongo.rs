// ai
//! # 🍃 THE MONGODB BACKEND
//!
//! *Previously, on Skux...*
//!
//! 🎬 COLD OPEN. INT. ATLAS DASHBOARD, 2:13 AM
//!
//! The connection string is 240 characters long and contains a password with
//! an `@` in it. The cluster is green. The index is... somewhere. Someone
//! created it by hand in 2022 with `unique: false`, and it has been quietly
//! ruining everyone's upserts ever since.
//!
//! 🚀 This module sends product upserts into MongoDB. One batch → one
//! `update` command carrying every op in `updates: [...]`, each with
//! `upsert: true`. A batch too big for one command (over 100,000 ops or
//! about 16 MB) goes out as several, and their replies are added up. The server's reply (`n`, `nModified`, `upserted`,
//! `writeErrors`) becomes a [`BulkWriteOutcome`]. One round trip per batch,
//! any server version, and per-op failures come back as data instead of as
//! an exception with partial amnesia.
//!
//! ## Knowledge Graph 🧠
//! - Config: `MongoSinkConfig` (co-located, as is tradition)
//! - Connect: `ClientOptions::parse` → optional TLS override → `Client` → `ping`
//! - Index: `create_index({field: 1}, unique)`
//! - Writes: `split_updates` → `run_command({update, updates, ordered})` per chunk
//!   → `parse_update_reply` → `absorb_chunk`
//! - With `ordered: false` the server commits every op it can; failures land
//!   in `writeErrors` and the call itself still succeeds.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

use std::ops::Range;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{ClientOptions, IndexOptions, Tls, TlsOptions};
use mongodb::{Client, Database, IndexModel};
use serde::Deserialize;
use tracing::{debug, info};

use crate::app_config::lenient;
use crate::backends::Collection;
use crate::common::{BulkWriteOutcome, WriteFailure};
use crate::composers::UpsertOne;

/// 🍃 Where the products go to live.
#[derive(Debug, Deserialize, Clone)]
pub struct MongoSinkConfig {
    /// 🔒 Connection string. Required. Its absence is a configuration error, not a vibe.
    #[serde(default, deserialize_with = "lenient::optional_string")]
    pub uri: Option<String>,
    #[serde(default = "default_database", deserialize_with = "lenient::string")]
    pub database: String,
    #[serde(default = "default_collection", deserialize_with = "lenient::string")]
    pub collection: String,
    /// ⚠️ Accept any certificate the server waves at us. For dev clusters with
    /// self-signed certs only. Production should leave this off.
    #[serde(default)]
    pub tls_allow_invalid_certificates: bool,
}

fn default_database() -> String {
    "product_db".to_string()
}

fn default_collection() -> String {
    "products".to_string()
}

impl Default for MongoSinkConfig {
    fn default() -> Self {
        Self {
            uri: None,
            database: default_database(),
            collection: default_collection(),
            tls_allow_invalid_certificates: false,
        }
    }
}

impl MongoSinkConfig {
    /// 🔒 The URI, or a configuration error explaining where it should have come from.
    pub(crate) fn require_uri(&self) -> Result<&str> {
        match self.uri.as_deref().map(str::trim) {
            Some(uri) if !uri.is_empty() => Ok(uri),
            _ => bail!(
                "💀 MONGO_URI missing. Set MONGO_URI, SKUX_SINK_CONFIG__MONGO__URI, or \
                 [sink_config.mongo] uri in the config file. We can't upsert into the void."
            ),
        }
    }
}

/// 📡 A live handle on one MongoDB collection.
#[derive(Debug)]
pub(crate) struct MongoCollection {
    database: Database,
    config: MongoSinkConfig,
}

impl MongoCollection {
    /// 🚀 Parse the URI, build the client, and ping the server.
    ///
    /// The ping is the handshake: a bad host or bad credentials fail here,
    /// before the first batch is composed, not halfway through the file.
    pub(crate) async fn connect(config: MongoSinkConfig) -> Result<Self> {
        let uri = config.require_uri()?;

        let mut options = ClientOptions::parse(uri)
            .await
            .context("💀 MongoDB rejected the connection string before we even dialed. Check the scheme, the host list, and any '@' hiding in the password.")?;
        if config.tls_allow_invalid_certificates {
            options.tls = Some(Tls::Enabled(
                TlsOptions::builder().allow_invalid_certificates(true).build(),
            ));
        }
        options.app_name.get_or_insert_with(|| "skux".to_string());

        let client = Client::with_options(options)
            .context("💀 The MongoDB client refused to be born. The options parsed, the driver did not agree.")?;
        let database = client.database(&config.database);

        database
            .run_command(doc! { "ping": 1 })
            .await
            .context("💀 Pinged MongoDB and got ghosted. Is the cluster up? Is our IP on the allow list? Is it DNS? It's always DNS.")?;

        info!(
            "🍃 Connected to MongoDB db={}, coll={}",
            config.database, config.collection
        );
        Ok(Self { database, config })
    }
}

#[async_trait]
impl Collection for MongoCollection {
    async fn ensure_unique_index(&mut self, field: &str) -> Result<()> {
        let mut keys = Document::new();
        keys.insert(field, 1_i32);
        let the_index = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build();

        let created = self
            .database
            .collection::<Document>(&self.config.collection)
            .create_index(the_index)
            .await
            .context(format!(
                "💀 Could not create unique index on '{}.{}'",
                self.config.collection, field
            ))?;
        debug!("🔑 unique index ready: {}", created.index_name);
        Ok(())
    }

    async fn bulk_write(&mut self, ops: Vec<UpsertOne>, ordered: bool) -> Result<BulkWriteOutcome> {
        let updates: Vec<Document> = ops
            .iter()
            .map(|op| {
                doc! {
                    "q": op.filter(),
                    "u": op.update(),
                    "upsert": true,
                    "multi": false,
                }
            })
            .collect();

        let the_sizes = updates
            .iter()
            .map(|u| mongodb::bson::to_vec(u).map(|bytes| bytes.len() + ARRAY_ENTRY_OVERHEAD))
            .collect::<std::result::Result<Vec<usize>, _>>()
            .context("💀 Could not serialize an upsert to measure it. Something in the row is not BSON-shaped.")?;
        let the_chunks = split_updates(&the_sizes, MAX_WRITE_BATCH_OPS, MAX_WRITE_BATCH_BYTES);
        if the_chunks.len() > 1 {
            debug!(
                "✂️ {} ops split into {} update commands to fit the server's limits",
                ops.len(),
                the_chunks.len()
            );
        }

        let mut the_outcome = BulkWriteOutcome::default();
        let mut remaining = updates.into_iter();
        for range in the_chunks {
            let chunk: Vec<Document> = remaining.by_ref().take(range.len()).collect();
            let the_command = doc! {
                "update": self.config.collection.as_str(),
                "updates": chunk,
                "ordered": ordered,
            };

            let the_reply = self
                .database
                .run_command(the_command)
                .await
                .context(format!(
                    "💀 The bulk update of ops {}..{} (of {}) never landed in '{}'. Those ops are lost; earlier commands are already committed.",
                    range.start,
                    range.end,
                    ops.len(),
                    self.config.collection
                ))?;

            let the_part = parse_update_reply(&the_reply)?;
            // -- 🛑 ordered means the server stopped at the first failure; so do we
            let stop_here = ordered && !the_part.write_errors.is_empty();
            absorb_chunk(&mut the_outcome, the_part, range.start);
            if stop_here {
                break;
            }
        }

        Ok(the_outcome)
    }
}

/// 📏 Most write ops one `update` command may carry (the server's `maxWriteBatchSize`).
pub(crate) const MAX_WRITE_BATCH_OPS: usize = 100_000;
/// 📏 Byte budget for the `updates` array: 16 MiB minus room for the command envelope.
pub(crate) const MAX_WRITE_BATCH_BYTES: usize = 16 * 1024 * 1024 - 16 * 1024;
// -- array element header: type byte, index key, NUL
const ARRAY_ENTRY_OVERHEAD: usize = 8;

/// ✂️ Cut a run of serialized update sizes into consecutive ranges, each under
/// `max_ops` ops and `max_bytes` bytes. An update bigger than `max_bytes` on
/// its own still gets a range, so the server can reject just that one.
pub(crate) fn split_updates(sizes: &[usize], max_ops: usize, max_bytes: usize) -> Vec<Range<usize>> {
    let max_ops = max_ops.max(1);
    let mut the_ranges = Vec::new();
    let mut start = 0;
    let mut bytes = 0;
    for (i, size) in sizes.iter().enumerate() {
        let full = i - start >= max_ops || (i > start && bytes + size > max_bytes);
        if full {
            the_ranges.push(start..i);
            start = i;
            bytes = 0;
        }
        bytes += size;
    }
    if start < sizes.len() {
        the_ranges.push(start..sizes.len());
    }
    the_ranges
}

/// ➕ Fold one sub-command's outcome into the batch's, moving its
/// `writeErrors` indexes from sub-command positions to batch positions.
pub(crate) fn absorb_chunk(total: &mut BulkWriteOutcome, part: BulkWriteOutcome, offset: usize) {
    total.matched += part.matched;
    total.modified += part.modified;
    total.upserted += part.upserted;
    total
        .write_errors
        .extend(part.write_errors.into_iter().map(|failure| WriteFailure {
            index: failure.index + offset,
            ..failure
        }));
}

// -- 🔢 the server picks int32 or int64 depending on its mood
fn count_of(reply: &Document, key: &str) -> u64 {
    match reply.get(key) {
        Some(Bson::Int32(n)) => (*n).max(0) as u64,
        Some(Bson::Int64(n)) => (*n).max(0) as u64,
        Some(Bson::Double(n)) if n.is_finite() && *n > 0.0 => *n as u64,
        _ => 0,
    }
}

/// 📜 Translate an `update` command reply into a [`BulkWriteOutcome`].
///
/// `n` counts matched + upserted, so `matched = n - upserted.len()`.
/// A `writeConcernError` means the writes may not be durable; that is a
/// failed call, not a per-op hiccup.
pub(crate) fn parse_update_reply(reply: &Document) -> Result<BulkWriteOutcome> {
    if let Ok(the_concern) = reply.get_document("writeConcernError") {
        bail!(
            "💀 Write concern failed: {}. The server accepted the ops but won't vouch for them.",
            the_concern.get_str("errmsg").unwrap_or("no errmsg given")
        );
    }

    let upserted = reply.get_array("upserted").map(|a| a.len() as u64).unwrap_or(0);
    let n = count_of(reply, "n");

    let write_errors = match reply.get_array("writeErrors") {
        Ok(errors) => errors
            .iter()
            .filter_map(Bson::as_document)
            .map(|e| WriteFailure {
                index: count_of(e, "index") as usize,
                code: match e.get("code") {
                    Some(Bson::Int32(c)) => *c,
                    Some(Bson::Int64(c)) => *c as i32,
                    _ => -1,
                },
                message: e.get_str("errmsg").unwrap_or("").to_string(),
            })
            .collect(),
        Err(_) => Vec::new(),
    };

    Ok(BulkWriteOutcome {
        matched: n.saturating_sub(upserted),
        modified: count_of(reply, "nModified"),
        upserted,
        write_errors,
    })
}
