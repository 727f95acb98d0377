//! Logger configuration

use crate::intercept::DEFAULT_OPT_OUT_MARKER;
use crate::storage::{DEFAULT_MAX_ENTRIES, DEFAULT_RETENTION_DAYS, DEFAULT_TRANSCRIPT_MAX_BYTES};
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const STORAGE_DIR_NAME: &str = "netlog";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Private directory for bodies and transcripts
    pub storage_path: PathBuf,
    /// Records kept in memory before the oldest is evicted
    pub max_entries: usize,
    /// Artifacts older than this many days are swept
    pub retention_days: u32,
    /// Pending records older than this (or their own timeout, if longer) become abandoned
    pub abandon_after: Duration,
    /// Sessions whose identifier contains this are not captured
    pub opt_out_marker: String,
    /// Transcript size at which a new file is started
    pub transcript_max_bytes: u64,
    /// How often the maintenance task abandons stale records
    pub maintenance_interval: Duration,
    /// How often the maintenance task runs a retention sweep
    pub sweep_interval: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            max_entries: DEFAULT_MAX_ENTRIES,
            retention_days: DEFAULT_RETENTION_DAYS,
            abandon_after: Duration::from_secs(300),
            opt_out_marker: DEFAULT_OPT_OUT_MARKER.to_string(),
            transcript_max_bytes: DEFAULT_TRANSCRIPT_MAX_BYTES,
            maintenance_interval: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl LoggerConfig {
    /// Defaults rooted at `storage_path`
    pub fn with_storage_path(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_entries == 0 {
            bail!("max_entries must be at least 1");
        }
        if self.retention_days == 0 {
            bail!("retention_days must be at least 1");
        }
        if self.transcript_max_bytes == 0 {
            bail!("transcript_max_bytes must be positive");
        }
        if self.abandon_after.is_zero() {
            bail!("abandon_after must be positive");
        }
        if self.maintenance_interval.is_zero() || self.sweep_interval.is_zero() {
            bail!("maintenance intervals must be positive");
        }
        if self.opt_out_marker.trim().is_empty() {
            bail!("opt_out_marker must not be empty");
        }
        Ok(())
    }
}

fn default_storage_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(STORAGE_DIR_NAME)
}
