use std::collections::BTreeSet;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

/// Seconds in a day, for retention arithmetic
pub const SECS_PER_DAY: u64 = 24 * 3600;

/// Exemption rules resolved for one invocation.
///
/// User exemptions are numeric owner ids. Path exemptions are matched by
/// plain substring containment anywhere in the path, never as prefixes or
/// patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exemptions {
    users: BTreeSet<u32>,
    paths: Vec<String>,
}

impl Exemptions {
    pub fn new(users: impl IntoIterator<Item = u32>, paths: impl IntoIterator<Item = String>) -> Self {
        Self {
            users: users.into_iter().collect(),
            paths: paths.into_iter().filter(|p| !p.is_empty()).collect(),
        }
    }

    pub fn is_user_exempt(&self, uid: u32) -> bool {
        self.users.contains(&uid)
    }

    /// True when `path` contains any configured substring verbatim
    pub fn is_path_exempt(&self, path: &Path) -> bool {
        let haystack = path.as_os_str().as_bytes();
        self.paths
            .iter()
            .any(|needle| contains_bytes(haystack, needle.as_bytes()))
    }

    pub fn users(&self) -> impl Iterator<Item = u32> + '_ {
        self.users.iter().copied()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Validated settings for one command invocation.
///
/// Built once by [`ConfigManager::load_settings`](crate::config::ConfigManager::load_settings)
/// and passed by reference into every service; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub last_access_days: u32,
    pub notify_days: u32,
    pub mail_server: String,
    pub admin_email: String,
    pub from_email: String,
    pub from_name: String,
    pub mail_domain: String,
    pub find_command: String,
    pub user_subject_template: String,
    pub user_message_template: String,
    pub exemptions: Exemptions,
}

impl Settings {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.last_access_days) * SECS_PER_DAY)
    }
}
