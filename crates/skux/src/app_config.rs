// ai
//! 🔧 App Configuration: env vars, a TOML file, and a few CLI flags walk into a struct.
//!
//! 📡 "MONGO_URI missing." The log line every new teammate meets on day one 🦆
//!
//! 🏗️ Layering, later wins:
//! 1. the flat env vars the deployment has always set (`CSV_PATH`, `MONGO_URI`, ...)
//! 2. `SKUX_*` env vars, `__` for nesting (`SKUX_RUNTIME__BATCH_SIZE=500`)
//! 3. the optional TOML file
//! 4. CLI overrides, applied by the caller through [`Overrides`]
//!
//! Nothing here reads the environment at import time. `load_config` is called
//! once, the result is passed by value, and every component gets only its own slice.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::Deserialize;

use crate::backends::{ArchiveConfig, CsvSourceConfig, SinkConfig};
use crate::supervisors::config::RuntimeConfig;

/// 📦 Everything one run needs to know about itself.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub csv: CsvSourceConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub sink_config: SinkConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// 🔊 Log filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level", deserialize_with = "lenient::string")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 🎛️ Command-line overrides, the last and loudest layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub csv_path: Option<PathBuf>,
    pub batch_size: Option<usize>,
    /// 🧪 swap the sink for the in-memory collection
    pub dry_run: bool,
    /// 🙅 skip raw archival even if a bucket is configured
    pub no_archive: bool,
}

impl AppConfig {
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(path) = overrides.csv_path {
            self.csv.path = path;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.runtime.batch_size = batch_size;
        }
        if overrides.dry_run {
            self.sink_config = SinkConfig::InMemory;
        }
        if overrides.no_archive {
            self.archive.bucket = None;
        }
    }

    /// ✅ Catch configuration mistakes before any file, bucket, or server is touched.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.batch_size == 0 {
            bail!("💀 runtime.batch_size must be at least 1, got 0.");
        }
        if self.csv.page_size == 0 {
            bail!("💀 csv.page_size must be at least 1, got 0.");
        }
        if !self.csv.delimiter.is_ascii() {
            bail!(
                "💀 csv.delimiter must be a single ASCII character, got '{}'.",
                self.csv.delimiter
            );
        }
        if let SinkConfig::Mongo(ref mongo) = self.sink_config {
            mongo.require_uri()?;
        }
        Ok(())
    }
}

/// 🗺️ The flat env vars older deployments set, and where they land in the tree.
const LEGACY_ENV: [(&str, &str); 7] = [
    ("CSV_PATH", "csv.path"),
    ("AWS_S3_BUCKET", "archive.bucket"),
    ("AWS_REGION", "archive.region"),
    ("MONGO_URI", "sink_config.mongo.uri"),
    ("MONGO_DB", "sink_config.mongo.database"),
    ("MONGO_COLLECTION", "sink_config.mongo.collection"),
    ("LOG_LEVEL", "log_level"),
];

/// 🧱 The provider stack, without extracting. Split out so tests can poke at it.
///
/// The legacy vars go in as plain strings: `MONGO_DB=2024` names a database,
/// and `AWS_S3_BUCKET=000123` keeps its zeros.
pub fn config_layers(config_file_name: Option<&Path>) -> Figment {
    let mut config = Figment::new();
    for (env, path) in LEGACY_ENV {
        if let Ok(value) = std::env::var(env) {
            config = config.merge(Serialized::default(path, value));
        }
    }
    let config = config.merge(Env::prefixed("SKUX_").split("__"));

    match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    }
}

/// 🚀 Load the config from env vars and, if given, a TOML file.
///
/// No validation here; call [`AppConfig::validate`] once overrides are applied.
pub fn load_config(config_file_name: Option<&Path>) -> Result<AppConfig> {
    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from '{}' and the environment (SKUX_*, CSV_PATH, MONGO_URI, ...). \
             A typo in a key name is the usual suspect.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from the environment (SKUX_*, CSV_PATH, MONGO_URI, ...). \
                 No file was involved, this one's all on the env."
            .to_string(),
    };

    config_layers(config_file_name).extract().context(context_msg)
}

/// 🔢 Deserializers for string-ish settings that a parsing provider may hand
/// over as a number or a bool (`SKUX_ARCHIVE__BUCKET=123456` arrives as an int).
pub(crate) mod lenient {
    use std::path::PathBuf;

    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Flag(bool),
    }

    impl From<Scalar> for String {
        fn from(scalar: Scalar) -> Self {
            match scalar {
                Scalar::Text(s) => s,
                Scalar::Unsigned(n) => n.to_string(),
                Scalar::Signed(n) => n.to_string(),
                Scalar::Float(n) => n.to_string(),
                Scalar::Flag(b) => b.to_string(),
            }
        }
    }

    pub(crate) fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Scalar::deserialize(deserializer).map(String::from)
    }

    pub(crate) fn optional_string<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Option::<Scalar>::deserialize(deserializer).map(|s| s.map(String::from))
    }

    pub(crate) fn path<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
        string(deserializer).map(PathBuf::from)
    }
}
