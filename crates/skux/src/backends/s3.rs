// ai
//! 🪣🚀🌐 S3 Archive Backend: the raw file's safety deposit box.
//!
//! INT. AWS CONSOLE, NIGHT. A bucket named something like
//! `acme-raw-ingest-prod-eu-west-1-final-v2` waits. Every run drops the
//! untouched CSV into it before a single row is normalized, so when someone
//! asks "what did the file look like on Tuesday?" there is an answer that
//! isn't a shrug.
//!
//! Keys are `{key_prefix}/{unix_seconds}_{file_name}`, which sort by time
//! lexically until the year 2286, at which point it becomes someone else's
//! problem.
//!
//! 🧠 Knowledge graph:
//! - Config co-located: `ArchiveConfig` (bucket optional; no bucket = no archival)
//! - Client: `aws_config::defaults(latest)` + region, optional custom endpoint and
//!   path-style addressing for S3-compatible stores (MinIO, LocalStack, ...)
//! - Upload: `ByteStream::from_path` → `PutObject`. No retry. Failures propagate.
//!
//! 🦆 The duck has no clearance for AWS. It watches from the edge of the VPC.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use serde::Deserialize;
use tracing::info;

use crate::app_config::lenient;
use crate::backends::{Archive, ArchiveReceipt};

/// 🔧 Where (and whether) the raw input gets backed up.
#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    /// 🪣 Destination bucket. `None` → archival is skipped with a warning.
    #[serde(default, deserialize_with = "lenient::optional_string")]
    pub bucket: Option<String>,
    /// 🌎 AWS region
    #[serde(default = "default_region", deserialize_with = "lenient::string")]
    pub region: String,
    /// 🗂️ Key prefix in front of `{ts}_{file_name}`
    #[serde(default = "default_key_prefix", deserialize_with = "lenient::string")]
    pub key_prefix: String,
    /// 🏠 Custom endpoint for S3-compatible stores
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    // -- 🇮🇪 where the reference deployment kept its raw files
    "eu-west-1".to_string()
}

fn default_key_prefix() -> String {
    "raw/products".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: default_region(),
            key_prefix: default_key_prefix(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl ArchiveConfig {
    /// 🪣 The bucket, if one is configured and not blank.
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref().map(str::trim).filter(|b| !b.is_empty())
    }
}

/// 🗝️ Build the archive key for a run: `{prefix}/{unix_ts}_{file_name}`.
pub fn archive_key(key_prefix: &str, unix_ts: i64, local_path: &Path) -> String {
    let the_file_name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input.csv".to_string());
    let the_prefix = key_prefix.trim_matches('/');
    if the_prefix.is_empty() {
        format!("{unix_ts}_{the_file_name}")
    } else {
        format!("{the_prefix}/{unix_ts}_{the_file_name}")
    }
}

/// 🪣 Uploads raw input files to an S3 bucket.
#[derive(Debug)]
pub(crate) struct S3Archive {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Archive {
    /// 🚀 Build an S3 client from the environment (env vars → ~/.aws → IAM role → hope).
    ///
    /// No network traffic happens here; credentials are resolved lazily on the first upload.
    pub(crate) async fn new(config: &ArchiveConfig, bucket: &str) -> Result<Self> {
        let the_aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut the_s3_config = aws_sdk_s3::config::Builder::from(&the_aws_config)
            .force_path_style(config.force_path_style);
        if let Some(ref endpoint) = config.endpoint_url {
            the_s3_config = the_s3_config.endpoint_url(endpoint);
        }

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(the_s3_config.build()),
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl Archive for S3Archive {
    async fn upload(&mut self, local_path: &Path, key: &str) -> Result<ArchiveReceipt> {
        info!(
            "🪣 Uploading {} -> s3://{}/{}",
            local_path.display(),
            self.bucket,
            key
        );

        let the_bytes = tokio::fs::metadata(local_path)
            .await
            .context(format!(
                "💀 Can't read '{}' for archival. The file left before the backup could say goodbye.",
                local_path.display()
            ))?
            .len();
        let the_body = ByteStream::from_path(local_path).await.context(format!(
            "💀 Couldn't open '{}' as an upload stream.",
            local_path.display()
        ))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("text/csv")
            .body(the_body)
            .send()
            .await
            .context(format!(
                "💀 PutObject to s3://{}/{} failed. Check: bucket name, region, credentials, and whether \
                 IAM is having one of its days.",
                self.bucket, key
            ))?;

        Ok(ArchiveReceipt {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            bytes: the_bytes,
        })
    }
}
