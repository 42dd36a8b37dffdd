use crate::error::ExpireError;
use crate::models::Settings;
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{DateTime, Local};
use std::fs;
use std::time::Instant;
use tokio::process::Command;

use super::lists::rotate_with_daily_backup;

/// Quote `find -path` pattern metacharacters so `path` matches literally
pub fn escape_pattern(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Runs the external `find` to produce the CandidateList
///
/// The traversal is delegated entirely to `find`: regular files whose access
/// time is more than `last_access_days` days old, written null-delimited
/// straight into the list file. The tool's own `.expirefiles` directory is
/// pruned so state files never become candidates.
#[derive(Debug, Clone)]
pub struct ScanService {
    find_command: String,
    last_access_days: u32,
}

impl ScanService {
    pub fn new(settings: &Settings) -> Self {
        Self {
            find_command: settings.find_command.clone(),
            last_access_days: settings.last_access_days,
        }
    }

    /// Arguments for `find`
    pub fn build_find_args(&self, root: &Utf8Path, config_dir: &Utf8Path, output: &Utf8Path) -> Vec<String> {
        vec![
            root.to_string(),
            "-path".to_string(),
            escape_pattern(config_dir.as_str()),
            "-prune".to_string(),
            "-o".to_string(),
            "-type".to_string(),
            "f".to_string(),
            "-atime".to_string(),
            format!("+{}", self.last_access_days),
            "-fprint0".to_string(),
            output.to_string(),
        ]
    }

    /// Replace the CandidateList with a fresh scan of `root`.
    ///
    /// The previous list is moved to its same-day backup first. A non-zero
    /// exit from `find` is fatal and any partial output is discarded.
    pub async fn scan(
        &self,
        root: &Utf8Path,
        config_dir: &Utf8Path,
        candidates: &Utf8Path,
        now: DateTime<Local>,
    ) -> Result<()> {
        rotate_with_daily_backup(candidates, now)?;

        let args = self.build_find_args(root, config_dir, candidates);
        tracing::info!("Running {} {}", self.find_command, args.join(" "));

        let start = Instant::now();
        let status = Command::new(&self.find_command)
            .args(&args)
            .status()
            .await
            .with_context(|| format!("Failed to run {}", self.find_command))?;

        tracing::info!(
            "{} completed in {:.2}s with {}",
            self.find_command,
            start.elapsed().as_secs_f32(),
            status
        );

        if !status.success() {
            if candidates.exists() {
                fs::remove_file(candidates)
                    .with_context(|| format!("Failed to discard partial list: {}", candidates))?;
            }
            return Err(ExpireError::ScanFailed {
                root: root.to_path_buf(),
                status: status.to_string(),
            }
            .into());
        }

        if !candidates.exists() {
            // find only creates the -fprint0 target when it runs; keep the
            // "find has run" marker even for an empty tree.
            fs::write(candidates, b"")
                .with_context(|| format!("Failed to create {}", candidates))?;
        }

        Ok(())
    }
}
