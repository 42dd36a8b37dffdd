use crate::error::ExpireError;
use crate::models::config::is_blank_entry;
use crate::models::{Exemptions, ExpireConfig, Settings};
use crate::services::identity::IdentityDb;
use crate::services::lists::UserCache;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Hidden directory holding all expirefiles state for a target directory
pub const CONFIG_DIR_NAME: &str = ".expirefiles";
pub const CONFIG_FILE: &str = "config.yaml";
pub const CACHE_DIR_NAME: &str = "USER_FILE_CACHE";
pub const FILES_TO_DELETE: &str = "files_to_delete.raw";
pub const FILES_DELETED: &str = "files_deleted.txt";
pub const LOG_DIR_NAME: &str = "logs";

/// Environment prefix for configuration overrides, e.g.
/// `EXPIREFILES_DEFAULTS__MAIL_SERVER=relay.example.com`
pub const ENV_PREFIX: &str = "EXPIREFILES";

/// Allowed notice period in days
pub const MIN_NOTIFY_DAYS: u32 = 7;
pub const MAX_NOTIFY_DAYS: u32 = 28;

/// Outcome of [`ConfigManager::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    AlreadyExists,
}

/// Configuration manager for one target directory.
///
/// Owns the on-disk layout under `<target>/.expirefiles/`:
/// - `config.yaml`: run defaults, exemption lists, message templates
/// - `files_to_delete.raw`: the CandidateList written by `find`
/// - `USER_FILE_CACHE/<uid>`: one PerUserList per owner
/// - `files_deleted.txt`: audit of the last full removal
/// - `logs/`: rolling command logs
#[derive(Debug, Clone)]
pub struct ConfigManager {
    target_dir: Utf8PathBuf,
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager for `target_dir`.
    ///
    /// The directory must exist and must not be a symlink. Relative paths are
    /// made absolute against the current directory.
    pub fn new<P: AsRef<Utf8Path>>(target_dir: P) -> Result<Self> {
        let absolute = std::path::absolute(target_dir.as_ref())
            .with_context(|| format!("Failed to resolve {}", target_dir.as_ref()))?;
        let target_dir = Utf8PathBuf::try_from(absolute)
            .map_err(|e| ExpireError::TargetNotUtf8(e.into_path_buf()))?;

        let metadata = match fs::symlink_metadata(&target_dir) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExpireError::TargetMissing(target_dir).into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat {}", target_dir));
            }
        };
        if metadata.file_type().is_symlink() {
            return Err(ExpireError::TargetIsSymlink(target_dir).into());
        }

        let config_dir = target_dir.join(CONFIG_DIR_NAME);
        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE),
            config_dir,
            target_dir,
        })
    }

    /// Create the config directory and a default config file.
    ///
    /// An existing config file is left untouched.
    pub fn init(&self) -> Result<InitOutcome> {
        if !self.config_dir.exists() {
            tracing::info!("Creating {}", self.config_dir);
            fs::create_dir(&self.config_dir)
                .with_context(|| format!("Failed to create config directory: {}", self.config_dir))?;
        }

        if self.config_path.exists() {
            tracing::info!("{} already exists", self.config_path);
            return Ok(InitOutcome::AlreadyExists);
        }

        self.save_config(&ExpireConfig::default())?;
        Ok(InitOutcome::Created)
    }

    /// Load the raw configuration: YAML file layered with environment overrides
    pub fn load_config(&self) -> Result<ExpireConfig> {
        if !self.config_path.exists() {
            return Err(ExpireError::NotInitialized(self.target_dir.clone()).into());
        }

        let layered = config::Config::builder()
            .add_source(
                config::File::from(self.config_path.as_std_path()).format(config::FileFormat::Yaml),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| ExpireError::InvalidConfig(format!("{}: {}", self.config_path, e)))?;

        let config: ExpireConfig = layered
            .try_deserialize()
            .map_err(|e| ExpireError::InvalidConfig(format!("{}: {}", self.config_path, e)))?;

        tracing::debug!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the configuration file.
    pub fn save_config(&self, config: &ExpireConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Load and validate the configuration into immutable [`Settings`].
    ///
    /// User exemptions are resolved to numeric ids here; an unknown login
    /// name is a configuration error.
    pub fn load_settings(&self, identity: &dyn IdentityDb) -> Result<Settings> {
        let config = self.load_config()?;
        Ok(build_settings(config, identity)?)
    }

    pub fn target_dir(&self) -> &Utf8Path {
        &self.target_dir
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Path of the CandidateList
    pub fn candidates_path(&self) -> Utf8PathBuf {
        self.config_dir.join(FILES_TO_DELETE)
    }

    /// Path of the deletion audit file
    pub fn audit_path(&self) -> Utf8PathBuf {
        self.config_dir.join(FILES_DELETED)
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        self.config_dir.join(LOG_DIR_NAME)
    }

    pub fn user_cache(&self) -> UserCache {
        UserCache::new(self.config_dir.join(CACHE_DIR_NAME))
    }
}

/// Validate a raw configuration and resolve its exemptions
pub fn build_settings(config: ExpireConfig, identity: &dyn IdentityDb) -> Result<Settings, ExpireError> {
    let ExpireConfig {
        defaults,
        exceptions,
        messages,
    } = config;

    if !(MIN_NOTIFY_DAYS..=MAX_NOTIFY_DAYS).contains(&defaults.notify_days) {
        return Err(ExpireError::NoticePeriodOutOfRange(defaults.notify_days));
    }
    if defaults.last_access_days == 0 {
        return Err(ExpireError::RetentionOutOfRange(defaults.last_access_days));
    }

    let mut user_ids = Vec::new();
    for entry in exceptions.users.iter().filter(|e| !is_blank_entry(e)) {
        let entry = entry.trim();
        let uid = if entry.bytes().all(|b| b.is_ascii_digit()) {
            entry
                .parse::<u32>()
                .map_err(|_| ExpireError::InvalidExemptionUser(entry.to_string()))?
        } else {
            identity
                .user_by_name(entry)
                .map(|user| user.uid)
                .ok_or_else(|| ExpireError::InvalidExemptionUser(entry.to_string()))?
        };
        user_ids.push(uid);
    }

    let paths = exceptions
        .paths
        .iter()
        .filter(|e| !is_blank_entry(e))
        .map(|e| e.trim().to_string());

    Ok(Settings {
        last_access_days: defaults.last_access_days,
        notify_days: defaults.notify_days,
        mail_server: defaults.mail_server,
        admin_email: defaults.admin_email,
        from_email: defaults.from_email,
        from_name: defaults.from_name,
        mail_domain: defaults
            .mail_domain
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| "localhost".to_string()),
        find_command: defaults.find_command,
        user_subject_template: messages.user_subject,
        user_message_template: messages.user_message,
        exemptions: Exemptions::new(user_ids, paths),
    })
}
