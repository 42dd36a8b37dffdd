// expirefiles - expire unused files on shared multi-user storage
//
// This is the library crate containing the pipeline services and data structures.
// The binary crate (main.rs) provides the command line entry point.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use error::ExpireError;
pub use models::{ExpireConfig, Settings};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
