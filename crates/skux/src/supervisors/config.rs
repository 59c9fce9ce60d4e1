//! 🎛️ Runtime knobs for the ingestion run. How big the batches are, when the
//! clock gets stamped, and how forgiving we are about rejected writes.

use serde::Deserialize;

use crate::composers::IngestedAtPolicy;
use crate::supervisors::upserter::DEFAULT_BATCH_SIZE;

/// 🎛️ Runtime behavior. Every field has a default, so an empty `[runtime]`
/// table (or none at all) is a perfectly valid opinion.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 📦 Upserts per bulk write. Must be at least 1.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// ⏱️ Whether `ingested_at` is rewritten on every run or kept from first insert.
    #[serde(default)]
    pub ingested_at_policy: IngestedAtPolicy,
    /// 🤷 When false, any per-op write error fails the run after all batches are attempted.
    #[serde(default)]
    pub tolerate_write_errors: bool,
    /// 📊 Draw the progress bar on stderr.
    #[serde(default = "default_progress")]
    pub progress: bool,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_progress() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            ingested_at_policy: IngestedAtPolicy::default(),
            tolerate_write_errors: false,
            progress: default_progress(),
        }
    }
}
