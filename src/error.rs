//! Error taxonomy for expirefiles.
//!
//! Every fatal condition a command can hit is one [`ExpireError`] variant.
//! Services return `anyhow::Result` and attach context; `main` walks the
//! chain back to the `ExpireError` to pick the process exit code.

use camino::Utf8PathBuf;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code for precondition violations and external failures.
pub const EXIT_FAILURE: u8 = 1;

/// Exit code for configuration errors.
pub const EXIT_CONFIG: u8 = 2;

/// Errors that abort an expirefiles command
#[derive(Error, Debug)]
pub enum ExpireError {
    #[error("path {0} does not exist")]
    TargetMissing(Utf8PathBuf),

    #[error("path {0} is symlink")]
    TargetIsSymlink(Utf8PathBuf),

    #[error("path {0} is not valid UTF-8")]
    TargetNotUtf8(PathBuf),

    #[error("no configuration found for {0}. Please run 'init' first.")]
    NotInitialized(Utf8PathBuf),

    #[error("You must run find first.")]
    CandidatesMissing,

    #[error("user file cache {0} is missing, run find first")]
    UserCacheMissing(Utf8PathBuf),

    #[error("invalid username -> {0}")]
    UnknownUser(String),

    #[error("invalid username in user exceptions -> {0}")]
    InvalidExemptionUser(String),

    #[error("notify_days needs to be <= 28 days and >= 7 days (got {0})")]
    NoticePeriodOutOfRange(u32),

    #[error("last_access_days must be at least 1 (got {0})")]
    RetentionOutOfRange(u32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("traversal of {root} failed with {status}")]
    ScanFailed { root: Utf8PathBuf, status: String },

    #[error("{} - {source}", path.display())]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to mail {recipient}: {reason}")]
    MailFailed { recipient: String, reason: String },
}

impl ExpireError {
    /// Whether this error came from the configuration store
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidExemptionUser(_)
                | Self::NoticePeriodOutOfRange(_)
                | Self::RetentionOutOfRange(_)
                | Self::InvalidConfig(_)
        )
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        if self.is_config_error() {
            EXIT_CONFIG
        } else {
            EXIT_FAILURE
        }
    }
}

/// Pick the exit code for an application error.
///
/// Falls back to [`EXIT_FAILURE`] when no [`ExpireError`] is in the chain.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ExpireError>())
        .map_or(EXIT_FAILURE, ExpireError::exit_code)
}
