//! Exemption evaluation over per-user candidate lists.
//!
//! Every entry of a PerUserList lands in exactly one of two buckets:
//! - **delete**: no exemption applies
//! - **except**: the owner is exempt, or the path contains an exempt substring
//!
//! A user exemption dominates: for an exempt owner no path is ever checked
//! against the path substrings. Both buckets are produced by the same
//! [`Classifier::disposition`] decision, so their counts always tile the list.
//!
//! Listing is lazy and restartable: each call reopens the list file and
//! streams it, so list size is not bounded by memory.

use crate::error::ExpireError;
use crate::models::{Disposition, Exemptions, Scope, UserCategory, UserCountRecord};
use crate::services::identity::IdentityDb;
use crate::services::lists::{UserCache, UserFileList};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Boxed lazy sequence of classified paths
pub type PathIter<'a> = Box<dyn Iterator<Item = Result<PathBuf>> + 'a>;

/// Applies [`Exemptions`] to PerUserLists
#[derive(Debug, Clone)]
pub struct Classifier<'a> {
    exemptions: &'a Exemptions,
}

impl<'a> Classifier<'a> {
    pub fn new(exemptions: &'a Exemptions) -> Self {
        Self { exemptions }
    }

    /// Decide one entry of owner `uid`'s list
    pub fn disposition(&self, uid: u32, path: &Path) -> Disposition {
        if self.exemptions.is_user_exempt(uid) || self.exemptions.is_path_exempt(path) {
            Disposition::Except
        } else {
            Disposition::Delete
        }
    }

    /// Entries of one list with the given disposition
    pub fn classified(&self, list: &UserFileList, want: Disposition) -> Result<PathIter<'a>> {
        let uid = list.uid;
        let classifier = self.clone();
        let entries = list.entries()?;

        Ok(Box::new(entries.filter_map(move |entry| match entry {
            Ok(path) => (classifier.disposition(uid, &path) == want).then_some(Ok(path)),
            Err(e) => Some(Err(anyhow::Error::new(e).context(format!(
                "Failed to read list for uid {}",
                uid
            )))),
        })))
    }

    /// Entries across a scope with the given disposition.
    ///
    /// A single-user scope requires that user's list to exist.
    pub fn classified_in(&self, cache: &UserCache, scope: Scope, want: Disposition) -> Result<PathIter<'a>> {
        if !cache.exists() {
            return Err(ExpireError::UserCacheMissing(cache.dir().to_path_buf()).into());
        }

        match scope {
            Scope::User(uid) => {
                let list = cache
                    .list_for(uid)
                    .ok_or_else(|| ExpireError::UserCacheMissing(cache.path_for(uid)))?;
                self.classified(&list, want)
            }
            Scope::AllUsers => {
                let classifier = self.clone();
                let lists = cache.lists()?;
                Ok(Box::new(lists.into_iter().flat_map(move |list| {
                    match classifier.classified(&list, want) {
                        Ok(iter) => iter,
                        Err(e) => Box::new(std::iter::once(Err(e))) as PathIter<'a>,
                    }
                })))
            }
        }
    }

    pub fn files_to_delete(&self, cache: &UserCache, scope: Scope) -> Result<PathIter<'a>> {
        self.classified_in(cache, scope, Disposition::Delete)
    }

    pub fn files_to_except(&self, cache: &UserCache, scope: Scope) -> Result<PathIter<'a>> {
        self.classified_in(cache, scope, Disposition::Except)
    }

    pub fn count_to_delete(&self, cache: &UserCache, scope: Scope) -> Result<usize> {
        count(self.files_to_delete(cache, scope)?)
    }

    pub fn count_to_except(&self, cache: &UserCache, scope: Scope) -> Result<usize> {
        count(self.files_to_except(cache, scope)?)
    }

    /// Aggregate one owner's list into a reporting row.
    ///
    /// The owner's category comes from the identity database: unknown ids are
    /// departed accounts, ids below the system threshold are system accounts.
    pub fn user_file_counts(&self, list: &UserFileList, identity: &dyn IdentityDb) -> Result<UserCountRecord> {
        let entry = identity.user_by_uid(list.uid);
        let category = UserCategory::from_uid(list.uid, entry.is_some());
        let user_name = entry.map_or_else(|| list.uid.to_string(), |user| user.name);

        let mut total = 0;
        let mut to_delete = 0;
        let mut to_except = 0;
        for path in list.entries()? {
            let path = path.map_err(|e| {
                anyhow::Error::new(e).context(format!("Failed to read list for uid {}", list.uid))
            })?;
            total += 1;
            match self.disposition(list.uid, &path) {
                Disposition::Delete => to_delete += 1,
                Disposition::Except => to_except += 1,
            }
        }
        debug_assert_eq!(total, to_delete + to_except);

        Ok(UserCountRecord {
            user_name,
            uid: list.uid,
            category,
            total,
            to_delete,
            to_except,
        })
    }

    /// Append the row for `list` to `records`
    pub fn append_user_file_counts(
        &self,
        records: &mut Vec<UserCountRecord>,
        list: &UserFileList,
        identity: &dyn IdentityDb,
    ) -> Result<()> {
        records.push(self.user_file_counts(list, identity)?);
        Ok(())
    }
}

fn count(mut iter: PathIter<'_>) -> Result<usize> {
    iter.try_fold(0usize, |n, entry| entry.map(|_| n + 1))
}
