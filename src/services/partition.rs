use crate::error::ExpireError;
use crate::metrics::Metrics;
use anyhow::{Context, Result};
use camino::Utf8Path;
use indexmap::IndexMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use super::lists::{UserCache, read_list, write_entry};

/// Summary of one partition pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionSummary {
    pub partitioned: usize,
    pub vanished: usize,
    pub owners: usize,
}

/// Prepend `prefix` to `path` as raw bytes
pub fn apply_prefix(prefix: Option<&str>, path: &Path) -> PathBuf {
    match prefix {
        Some(prefix) if !prefix.is_empty() => {
            let mut joined = OsString::from(prefix);
            joined.push(path.as_os_str());
            PathBuf::from(joined)
        }
        _ => path.to_path_buf(),
    }
}

/// Fan the CandidateList out into one PerUserList per owning uid.
///
/// The user cache is wiped and recreated first. Paths that no longer exist
/// are skipped. Each owner's output file is opened once, on its first path,
/// and every handle is flushed and closed before returning, including when
/// the pass fails part way.
pub fn partition_candidates(
    candidates: &Utf8Path,
    cache: &UserCache,
    prefix: Option<&str>,
    metrics: &Metrics,
) -> Result<PartitionSummary> {
    if !candidates.exists() {
        return Err(ExpireError::CandidatesMissing.into());
    }

    cache.recreate()?;
    if let Some(prefix) = prefix {
        tracing::info!("Recording paths with prefix {}", prefix);
    }

    let mut writers: IndexMap<u32, BufWriter<File>> = IndexMap::new();
    let mut summary = PartitionSummary::default();

    let pass = fan_out(candidates, cache, prefix, metrics, &mut writers, &mut summary);
    let closed = close_all(cache, writers);
    pass?;
    closed?;

    tracing::info!(
        "Partitioned {} paths across {} owners ({} no longer present)",
        summary.partitioned,
        summary.owners,
        summary.vanished
    );
    Ok(summary)
}

fn fan_out(
    candidates: &Utf8Path,
    cache: &UserCache,
    prefix: Option<&str>,
    metrics: &Metrics,
    writers: &mut IndexMap<u32, BufWriter<File>>,
    summary: &mut PartitionSummary,
) -> Result<()> {
    for entry in read_list(candidates)? {
        let path = entry.with_context(|| format!("Failed to read {}", candidates))?;

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!("Skipping {}: {}", path.display(), e);
                summary.vanished += 1;
                metrics.record_vanished();
                continue;
            }
        };
        let uid = metadata.uid();

        let writer = match writers.entry(uid) {
            indexmap::map::Entry::Occupied(slot) => slot.into_mut(),
            indexmap::map::Entry::Vacant(slot) => {
                let list_path = cache.path_for(uid);
                let file = File::create(&list_path)
                    .with_context(|| format!("Failed to create user list: {}", list_path))?;
                summary.owners += 1;
                metrics.record_owner();
                slot.insert(BufWriter::new(file))
            }
        };

        let recorded = apply_prefix(prefix, &path);
        write_entry(writer, &recorded)
            .with_context(|| format!("Failed to write user list for uid {}", uid))?;
        summary.partitioned += 1;
        metrics.record_partitioned();
    }
    Ok(())
}

fn close_all(cache: &UserCache, writers: IndexMap<u32, BufWriter<File>>) -> Result<()> {
    let mut first_error = None;
    for (uid, mut writer) in writers {
        if let Err(e) = writer.flush() {
            tracing::error!("Failed to flush user list for uid {}: {}", uid, e);
            first_error.get_or_insert_with(|| {
                anyhow::Error::new(e).context(format!("Failed to write {}", cache.path_for(uid)))
            });
        }
    }
    first_error.map_or(Ok(()), Err)
}
