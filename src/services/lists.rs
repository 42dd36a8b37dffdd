//! Null-delimited path lists and the per-user cache directory.
//!
//! The CandidateList and every PerUserList share one format: raw path bytes
//! separated by `\0`, no header, trailing terminator optional. Reading is
//! lazy so arbitrarily large lists never sit in memory.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

/// Entry terminator in every list file
pub const ENTRY_TERMINATOR: u8 = b'\0';

/// Lazy iterator over the entries of a null-delimited list.
///
/// Empty entries (doubled or trailing terminators) are skipped.
pub struct NullDelimited<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> NullDelimited<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for NullDelimited<R> {
    type Item = std::io::Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(ENTRY_TERMINATOR, &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    if self.buf.last() == Some(&ENTRY_TERMINATOR) {
                        self.buf.pop();
                    }
                    if self.buf.is_empty() {
                        continue;
                    }
                    let entry = OsString::from_vec(std::mem::take(&mut self.buf));
                    return Some(Ok(PathBuf::from(entry)));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Open a list file for lazy reading
pub fn read_list(path: &Utf8Path) -> Result<NullDelimited<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Failed to open list: {}", path))?;
    Ok(NullDelimited::new(BufReader::new(file)))
}

/// Append one entry, terminator included
pub fn write_entry<W: Write>(writer: &mut W, path: &Path) -> std::io::Result<()> {
    writer.write_all(path.as_os_str().as_bytes())?;
    writer.write_all(&[ENTRY_TERMINATOR])
}

/// Name of the same-day backup for `path`: `<path>.<YYYYMMDD>`
pub fn dated_backup_path(path: &Utf8Path, now: DateTime<Local>) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{}.{}", path, now.format("%Y%m%d")))
}

/// Move `path` aside to its same-day backup.
///
/// An existing backup from the same day is replaced, so there is at most one
/// backup per calendar day. Returns the backup path when a file was moved.
pub fn rotate_with_daily_backup(path: &Utf8Path, now: DateTime<Local>) -> Result<Option<Utf8PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let backup = dated_backup_path(path, now);
    if backup.exists() {
        fs::remove_file(&backup)
            .with_context(|| format!("Failed to remove old backup: {}", backup))?;
    }
    fs::rename(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path, backup))?;

    tracing::info!("Backed up {} to {}", path, backup);
    Ok(Some(backup))
}

/// Handle on one PerUserList file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFileList {
    pub uid: u32,
    pub path: Utf8PathBuf,
}

impl UserFileList {
    pub fn entries(&self) -> Result<NullDelimited<BufReader<File>>> {
        read_list(&self.path)
    }
}

/// The directory of PerUserLists, one file per owner id
#[derive(Debug, Clone)]
pub struct UserCache {
    dir: Utf8PathBuf,
}

impl UserCache {
    pub fn new<P: AsRef<Utf8Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Delete the whole cache and start an empty one
    pub fn recreate(&self) -> Result<()> {
        if self.dir.exists() {
            tracing::info!("Removing user file cache {}", self.dir);
            fs::remove_dir_all(&self.dir)
                .with_context(|| format!("Failed to remove user cache: {}", self.dir))?;
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create user cache: {}", self.dir))?;
        Ok(())
    }

    pub fn path_for(&self, uid: u32) -> Utf8PathBuf {
        self.dir.join(uid.to_string())
    }

    /// The list for `uid`, if that owner had any candidates
    pub fn list_for(&self, uid: u32) -> Option<UserFileList> {
        let path = self.path_for(uid);
        path.is_file().then_some(UserFileList { uid, path })
    }

    /// Every per-user list, ordered by owner id.
    ///
    /// Files whose names are not decimal ids are ignored.
    pub fn lists(&self) -> Result<Vec<UserFileList>> {
        let mut lists = Vec::new();
        for entry in self
            .dir
            .read_dir_utf8()
            .with_context(|| format!("Failed to read user cache: {}", self.dir))?
        {
            let entry = entry.with_context(|| format!("Failed to read user cache: {}", self.dir))?;
            let name = entry.file_name();
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if let Ok(uid) = name.parse::<u32>() {
                lists.push(UserFileList {
                    uid,
                    path: entry.path().to_path_buf(),
                });
            }
        }
        lists.sort_by_key(|list| list.uid);
        Ok(lists)
    }
}
