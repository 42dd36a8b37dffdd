//! Services module - the expirefiles pipeline.
//!
//! The services are framework-agnostic: no CLI parsing, no process exit,
//! every input passed explicitly (including the immutable
//! [`Settings`](crate::models::Settings) value).
//!
//! # Components
//!
//! - [`scanner`]: runs `find` to produce the CandidateList, rotating the
//!   previous list to a dated backup
//! - [`partition`]: fans the CandidateList out into one PerUserList per owner
//! - [`classifier`]: splits each PerUserList into delete / except buckets and
//!   aggregates per-owner counts
//! - [`notifier`]: deletion-date gating, admin summary and per-user messages
//! - [`remover`]: re-verified deletion with an audit trail
//! - [`lists`]: null-delimited list I/O and the user cache directory
//! - [`identity`], [`mailer`]: seams to the passwd database and the mail relay
//! - [`schedule`]: crontab suggestions

pub mod classifier;
pub mod identity;
pub mod lists;
pub mod mailer;
pub mod notifier;
pub mod partition;
pub mod remover;
pub mod scanner;
pub mod schedule;

pub use classifier::{Classifier, PathIter};
pub use identity::{IdentityDb, SystemIdentity, UserEntry};
pub use lists::{UserCache, UserFileList};
pub use mailer::{Mailer, SmtpMailer};
pub use notifier::{DeletionWindow, Notifier, NotifyReport, NotifyRequest};
pub use partition::{PartitionSummary, partition_candidates};
pub use remover::{RemoveOutcome, RemoveSummary, Remover};
pub use scanner::ScanService;
