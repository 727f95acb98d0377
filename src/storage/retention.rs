//! Age-based cleanup of logger artifacts
//!
//! Only names accepted by [`is_log_artifact`] are ever removed; anything else in
//! the directory is left alone no matter how old it is.

use crate::models::is_log_artifact;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_RETENTION_DAYS: u32 = 7;
const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub retained: usize,
    pub errors: usize,
}

#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    directory: PathBuf,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(directory: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            directory: directory.into(),
            retention: Duration::from_secs(retention_days as u64 * SECS_PER_DAY),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Delete recognized artifacts last modified before `now - retention`.
    pub fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let cutoff = now.checked_sub(self.retention).unwrap_or(UNIX_EPOCH);
        let report = self.remove_matching(|modified| modified < cutoff);
        if report.deleted > 0 {
            tracing::info!(
                "Retention sweep removed {} log artifacts older than {} days",
                report.deleted,
                self.retention.as_secs() / SECS_PER_DAY
            );
        }
        report
    }

    pub async fn sweep(&self) -> SweepReport {
        let sweeper = self.clone();
        tokio::task::spawn_blocking(move || sweeper.sweep_at(SystemTime::now()))
            .await
            .unwrap_or_else(|err| {
                tracing::error!("Retention sweep task failed: {}", err);
                SweepReport::default()
            })
    }

    /// Delete every recognized artifact regardless of age.
    pub fn delete_all_blocking(&self) -> SweepReport {
        let report = self.remove_matching(|_| true);
        tracing::info!("Deleted {} log artifacts", report.deleted);
        report
    }

    pub async fn delete_all(&self) -> SweepReport {
        let sweeper = self.clone();
        tokio::task::spawn_blocking(move || sweeper.delete_all_blocking())
            .await
            .unwrap_or_else(|err| {
                tracing::error!("Log wipe task failed: {}", err);
                SweepReport::default()
            })
    }

    fn remove_matching<F>(&self, should_delete: F) -> SweepReport
    where
        F: Fn(SystemTime) -> bool,
    {
        let mut report = SweepReport::default();
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return report,
            Err(err) => {
                tracing::warn!("Cannot list {:?} for retention: {}", self.directory, err);
                report.errors += 1;
                return report;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!("Skipping unreadable directory entry: {}", err);
                    report.errors += 1;
                    continue;
                }
            };
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !is_log_artifact(name) {
                continue;
            }

            let modified = match entry.metadata().and_then(|meta| {
                if meta.is_file() {
                    meta.modified().map(Some)
                } else {
                    Ok(None)
                }
            }) {
                Ok(Some(modified)) => modified,
                Ok(None) => continue,
                Err(err) => {
                    tracing::debug!("Cannot stat {}: {}", name, err);
                    report.errors += 1;
                    continue;
                }
            };

            if !should_delete(modified) {
                report.retained += 1;
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => report.deleted += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::debug!("Cannot delete {}: {}", name, err);
                    report.errors += 1;
                }
            }
        }
        report
    }
}
