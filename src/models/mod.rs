//! Data models for expirefiles.
//!
//! - [`ExpireConfig`]: the on-disk settings store (`.expirefiles/config.yaml`)
//! - [`Settings`]: the validated, immutable view of that store for one run
//! - [`Exemptions`]: resolved user-id and path-substring exemption rules
//! - [`UserCountRecord`]/[`UserCategory`]: per-owner reporting rows

pub mod config;
pub mod report;
pub mod settings;

pub use config::{Defaults, Exceptions, ExpireConfig, Messages};
pub use report::{Disposition, MAX_SYSTEM_UID, Scope, UserCategory, UserCountRecord};
pub use settings::{Exemptions, SECS_PER_DAY, Settings};
