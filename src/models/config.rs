use serde::{Deserialize, Serialize};

/// On-disk configuration from `.expirefiles/config.yaml`
///
/// Mirrors the three sections of the settings store: run defaults,
/// exemption lists and message templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExpireConfig {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub exceptions: Exceptions,

    #[serde(default)]
    pub messages: Messages,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_last_access_days")]
    pub last_access_days: u32,

    #[serde(default = "default_notify_days")]
    pub notify_days: u32,

    #[serde(default = "default_mail_server")]
    pub mail_server: String,

    #[serde(default = "default_admin_email")]
    pub admin_email: String,

    #[serde(default = "default_from_email")]
    pub from_email: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Domain appended to bare login names when mailing users
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_domain: Option<String>,

    #[serde(default = "default_find_command")]
    pub find_command: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            last_access_days: default_last_access_days(),
            notify_days: default_notify_days(),
            mail_server: default_mail_server(),
            admin_email: default_admin_email(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            mail_domain: None,
            find_command: default_find_command(),
        }
    }
}

/// Exemption rules as written by the administrator.
///
/// `users` holds login names or numeric ids; `paths` holds plain
/// substrings. Blank entries and entries starting with `#` are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exceptions {
    #[serde(default)]
    pub users: Vec<String>,

    #[serde(default)]
    pub paths: Vec<String>,
}

impl Default for Exceptions {
    fn default() -> Self {
        Self {
            users: vec!["root".to_string()],
            // "/." excepts every dotfile and dot-directory anywhere in the tree.
            paths: vec!["/no-delete/".to_string(), "/.".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Messages {
    #[serde(default = "default_user_subject")]
    pub user_subject: String,

    #[serde(default = "default_user_message")]
    pub user_message: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            user_subject: default_user_subject(),
            user_message: default_user_message(),
        }
    }
}

/// Returns true for exemption entries that carry no rule.
pub fn is_blank_entry(entry: &str) -> bool {
    let entry = entry.trim();
    entry.is_empty() || entry.starts_with('#')
}

fn default_last_access_days() -> u32 {
    60
}

fn default_notify_days() -> u32 {
    14
}

fn default_mail_server() -> String {
    "localhost".to_string()
}

fn default_admin_email() -> String {
    "admin".to_string()
}

fn default_from_email() -> String {
    "admin@widgets.com".to_string()
}

fn default_from_name() -> String {
    "Support".to_string()
}

fn default_find_command() -> String {
    "/usr/bin/find".to_string()
}

fn default_user_subject() -> String {
    "IMPORTANT Your {DIR_PATH} files not accessed for {LAST_ACCESS_DAYS} days will be deleted on {DELETE_DATE}"
        .to_string()
}

fn default_user_message() -> String {
    "\
Hi {USERNAME},

This is system generated message.

You have files that have not been accessed for over {LAST_ACCESS_DAYS} days
under {DIR_PATH}.

These files will be deleted on {DELETE_DATE}.

For a list of your files that will be deleted type the following
command on a login node.

    {COMMAND}

If you would like to keep these files, you may request an exception
from the scheduled deletion by writing to {FROM_EMAIL}.

Please note that your exception will *ONLY* be effective for the
currently scheduled deletion and you may *NOT* request an exception
if you have already had one in place for the previous two deletion
cycles.

*If* you have received confirmation of your exception, you may see
the list of files that have been excepted by entering the
following command on a login node.

    {COMMAND} --exceptions

And in this case, no option should now return an empty list.

Regards
{FROM_NAME}
{FROM_EMAIL}
"
    .to_string()
}
