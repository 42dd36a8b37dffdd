//! Lookups against the operating system's user and group database.
//!
//! Services only see the [`IdentityDb`] trait so tests can supply a fixed
//! account table instead of the host's passwd file.

use nix::unistd::{Gid, Group, Uid, User};

/// One passwd entry, reduced to what expirefiles needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub uid: u32,
    /// GECOS display name; may be empty
    pub gecos: String,
}

impl UserEntry {
    /// Name used to greet the user: GECOS name, or login name when unset
    pub fn display_name(&self) -> &str {
        let full_name = self.gecos.split(',').next().unwrap_or_default().trim();
        if full_name.is_empty() {
            &self.name
        } else {
            full_name
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait IdentityDb {
    fn user_by_uid(&self, uid: u32) -> Option<UserEntry>;

    fn user_by_name(&self, name: &str) -> Option<UserEntry>;
}

/// Resolve a user argument to an owner id.
///
/// Names resolve through the database; when `allow_numeric` is set, an
/// unresolvable all-digit argument is taken as the id itself.
pub fn resolve_uid(identity: &dyn IdentityDb, user: &str, allow_numeric: bool) -> Option<u32> {
    if let Some(entry) = identity.user_by_name(user) {
        return Some(entry.uid);
    }
    if allow_numeric && !user.is_empty() && user.bytes().all(|b| b.is_ascii_digit()) {
        return user.parse().ok();
    }
    None
}

/// [`IdentityDb`] backed by the host's passwd database
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentity;

impl SystemIdentity {
    pub fn new() -> Self {
        Self
    }

    /// Effective uid of this process
    pub fn current_uid(&self) -> u32 {
        Uid::effective().as_raw()
    }

    /// Whether the calling process belongs to `group_name`
    pub fn in_group(&self, group_name: &str) -> bool {
        let gid = match Group::from_name(group_name) {
            Ok(Some(group)) => group.gid,
            Ok(None) => return false,
            Err(e) => {
                tracing::debug!("Group lookup for {} failed: {}", group_name, e);
                return false;
            }
        };

        if Gid::effective() == gid {
            return true;
        }

        match nix::unistd::getgroups() {
            Ok(groups) => groups.contains(&gid),
            Err(e) => {
                tracing::debug!("getgroups failed: {}", e);
                false
            }
        }
    }
}

fn to_entry(user: User) -> UserEntry {
    UserEntry {
        name: user.name,
        uid: user.uid.as_raw(),
        gecos: user.gecos.to_string_lossy().into_owned(),
    }
}

impl IdentityDb for SystemIdentity {
    fn user_by_uid(&self, uid: u32) -> Option<UserEntry> {
        match User::from_uid(Uid::from_raw(uid)) {
            Ok(user) => user.map(to_entry),
            Err(e) => {
                tracing::warn!("passwd lookup for uid {} failed: {}", uid, e);
                None
            }
        }
    }

    fn user_by_name(&self, name: &str) -> Option<UserEntry> {
        match User::from_name(name) {
            Ok(user) => user.map(to_entry),
            Err(e) => {
                tracing::warn!("passwd lookup for {} failed: {}", name, e);
                None
            }
        }
    }
}
