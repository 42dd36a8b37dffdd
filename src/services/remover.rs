use crate::error::ExpireError;
use crate::metrics::Metrics;
use crate::models::{SECS_PER_DAY, Scope, Settings};
use crate::services::classifier::Classifier;
use crate::services::lists::{UserCache, rotate_with_daily_backup};
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{DateTime, Local};
use std::fs::{self, File, Metadata};
use std::io::{BufWriter, Write};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::SystemTime;

/// What happened to one candidate at removal time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Removed; carries the access-time listing taken just before removal
    Deleted(String),
    /// Check mode: would have been removed
    WouldDelete(String),
    /// Accessed again since the scan, kept
    Retained,
    /// Already gone
    Missing,
}

/// Totals for one removal pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveSummary {
    pub deleted: usize,
    pub retained: usize,
    pub missing: usize,
    pub audited: bool,
}

/// One listing line: mode, owner, size, last access, path
pub fn access_listing(path: &Path, metadata: &Metadata) -> String {
    let accessed = metadata
        .accessed()
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| "?".to_string());
    format!(
        "{:04o} {} {} {} {}",
        metadata.mode() & 0o7777,
        metadata.uid(),
        metadata.len(),
        accessed,
        path.display()
    )
}

/// Deletes the files the classifier marks for deletion.
///
/// Never trusts an earlier decision: membership is re-derived from the
/// PerUserLists, and each file's existence and access time are checked again
/// right before it is removed.
pub struct Remover<'a> {
    settings: &'a Settings,
    metrics: &'a Metrics,
    check: bool,
}

impl<'a> Remover<'a> {
    pub fn new(settings: &'a Settings, metrics: &'a Metrics, check: bool) -> Self {
        Self {
            settings,
            metrics,
            check,
        }
    }

    fn still_expired(&self, metadata: &Metadata, now: SystemTime) -> bool {
        let Ok(accessed) = metadata.accessed() else {
            return false;
        };
        let idle = now.duration_since(accessed).unwrap_or_default();
        idle.as_secs_f64() / SECS_PER_DAY as f64 > f64::from(self.settings.last_access_days)
    }

    /// Remove one file if it still exists and is still past retention
    pub fn remove_file(&self, path: &Path, now: SystemTime) -> Result<RemoveOutcome> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => {
                tracing::debug!("{} no longer exists", path.display());
                return Ok(RemoveOutcome::Missing);
            }
        };

        if !self.still_expired(&metadata, now) {
            tracing::debug!("{} was accessed since the scan, keeping it", path.display());
            self.metrics.record_retained();
            return Ok(RemoveOutcome::Retained);
        }

        let listing = access_listing(path, &metadata);
        if self.check {
            self.metrics.record_would_delete();
            return Ok(RemoveOutcome::WouldDelete(listing));
        }

        fs::remove_file(path).map_err(|source| ExpireError::RemoveFailed {
            path: path.to_path_buf(),
            source,
        })?;
        self.metrics.record_deleted();
        Ok(RemoveOutcome::Deleted(listing))
    }

    /// Remove everything to delete within `scope`.
    ///
    /// Only a full (all users) non-check run keeps an audit: the previous
    /// audit file is rotated to its same-day backup and one line is written
    /// per removed file. Check mode prints each listing to `out` instead.
    pub fn remove(
        &self,
        classifier: &Classifier<'_>,
        cache: &UserCache,
        scope: Scope,
        audit_path: &Utf8Path,
        out: &mut dyn Write,
        now: DateTime<Local>,
    ) -> Result<RemoveSummary> {
        let files = classifier.files_to_delete(cache, scope)?;

        let mut audit = if scope == Scope::AllUsers && !self.check {
            rotate_with_daily_backup(audit_path, now)?;
            let file = File::create(audit_path)
                .with_context(|| format!("Failed to create audit file: {}", audit_path))?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        let mut summary = RemoveSummary {
            audited: audit.is_some(),
            ..RemoveSummary::default()
        };
        let now = SystemTime::from(now);

        for path in files {
            let path = path?;
            match self.remove_file(&path, now)? {
                RemoveOutcome::Deleted(listing) => {
                    summary.deleted += 1;
                    if let Some(audit) = audit.as_mut() {
                        writeln!(audit, "{}", listing)
                            .with_context(|| format!("Failed to write audit file: {}", audit_path))?;
                    }
                }
                RemoveOutcome::WouldDelete(listing) => {
                    summary.deleted += 1;
                    writeln!(out, "{}", listing)?;
                }
                RemoveOutcome::Retained => summary.retained += 1,
                RemoveOutcome::Missing => summary.missing += 1,
            }
        }

        if let Some(mut audit) = audit {
            audit
                .flush()
                .with_context(|| format!("Failed to write audit file: {}", audit_path))?;
        }

        tracing::info!(
            "{} {} files ({} accessed since scan, {} already gone)",
            if self.check { "Would remove" } else { "Removed" },
            summary.deleted,
            summary.retained,
            summary.missing
        );
        Ok(summary)
    }
}
