//! Subcommand handlers.
//!
//! Each handler loads the target's settings, drives the services for one
//! stage of the cycle and reports to a [`Console`]. Soft conditions (lapsed
//! deletion window, nothing to do) are printed and return `Ok`.

use super::{CliCommand, ListArgs, PartitionArgs, Role, ScopedArgs, TargetArgs};
use crate::config::{ConfigManager, InitOutcome};
use crate::error::ExpireError;
use crate::metrics::Metrics;
use crate::models::{Scope, Settings, UserCountRecord};
use crate::services::classifier::Classifier;
use crate::services::identity::{IdentityDb, resolve_uid};
use crate::services::mailer::{Mailer, SmtpMailer};
use crate::services::notifier::{DeletionWindow, MAIL_DELAY, Notifier, NotifyRequest, format_date};
use crate::services::partition::partition_candidates;
use crate::services::remover::Remover;
use crate::services::scanner::ScanService;
use crate::services::schedule::{cron_days, crontab_lines};
use anyhow::{Context as _, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::time::Duration;

/// Collaborators shared by every handler
pub struct Context<'a> {
    pub identity: &'a dyn IdentityDb,
    /// Mail transport; `None` means SMTP through the configured relay
    pub mailer: Option<&'a dyn Mailer>,
    /// Program name used in crontab lines and in user instructions
    pub program: String,
    pub mail_delay: Duration,
    pub metrics: &'a Metrics,
    pub now: DateTime<Local>,
}

impl<'a> Context<'a> {
    pub fn new(identity: &'a dyn IdentityDb, metrics: &'a Metrics, program: impl Into<String>) -> Self {
        Self {
            identity,
            mailer: None,
            program: program.into(),
            mail_delay: MAIL_DELAY,
            metrics,
            now: Local::now(),
        }
    }

    pub fn with_mailer(mut self, mailer: &'a dyn Mailer) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_mail_delay(mut self, delay: Duration) -> Self {
        self.mail_delay = delay;
        self
    }

    pub fn at(mut self, now: DateTime<Local>) -> Self {
        self.now = now;
        self
    }
}

/// Output streams for command results and soft-condition notices
pub struct Console<'a> {
    pub out: &'a mut dyn Write,
    pub err: &'a mut dyn Write,
}

/// Run one parsed command for `role`
pub async fn run(ctx: &Context<'_>, role: &Role, command: &CliCommand, console: &mut Console<'_>) -> Result<()> {
    tracing::debug!("Running {:?} as {:?}", command, role);
    match command {
        CliCommand::Init(args) => init_files(ctx, args, console),
        CliCommand::Find(args) => find_files(ctx, args, console).await,
        CliCommand::Partition(args) => partition_files(ctx, args, console),
        CliCommand::Notify(args) => notify_users(ctx, args, console).await,
        CliCommand::Remove(args) => remove_files(ctx, args, console),
        CliCommand::Schedule(args) => schedule(ctx, args, console),
        CliCommand::List { args, user } => {
            let scope = match (role, user) {
                (Role::User { uid }, _) => ListScope::Own(*uid),
                (Role::Admin, Some(user)) => ListScope::Named(user.as_str()),
                (Role::Admin, None) => ListScope::All,
            };
            list_files(ctx, args, scope, console)
        }
    }
}

fn open_target(args: &TargetArgs) -> Result<ConfigManager> {
    ConfigManager::new(&args.dirname)
}

fn scanned_at(manager: &ConfigManager) -> Option<DateTime<Local>> {
    fs::metadata(manager.candidates_path())
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Local>::from)
}

fn write_schedule(ctx: &Context<'_>, manager: &ConfigManager, notify_days: u32, out: &mut dyn Write) -> Result<()> {
    let days = cron_days(scanned_at(manager), notify_days);
    writeln!(out, "Example crontab entries:")?;
    for line in crontab_lines(&ctx.program, manager.target_dir().as_str(), days) {
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

/// Create the config directory and default config, or suggest a schedule
/// when the directory is already initialized
pub fn init_files(ctx: &Context<'_>, args: &TargetArgs, console: &mut Console<'_>) -> Result<()> {
    let manager = open_target(args)?;

    match manager.init()? {
        InitOutcome::Created => {
            writeln!(console.out, "Created {}", manager.config_path())?;
            writeln!(console.out, "Review it, then run: {} find {}", ctx.program, manager.target_dir())?;
        }
        InitOutcome::AlreadyExists => {
            writeln!(console.out, "{} already exists", manager.config_path())?;
            let config = manager.load_config()?;
            write_schedule(ctx, &manager, config.defaults.notify_days, console.out)?;
        }
    }
    Ok(())
}

/// Print example crontab entries for an initialized directory
pub fn schedule(ctx: &Context<'_>, args: &TargetArgs, console: &mut Console<'_>) -> Result<()> {
    let manager = open_target(args)?;
    let settings = manager.load_settings(ctx.identity)?;
    write_schedule(ctx, &manager, settings.notify_days, console.out)
}

/// Scan for stale files, then partition them per owner
pub async fn find_files(ctx: &Context<'_>, args: &PartitionArgs, console: &mut Console<'_>) -> Result<()> {
    let manager = open_target(&args.target)?;
    let settings = manager.load_settings(ctx.identity)?;

    ScanService::new(&settings)
        .scan(
            manager.target_dir(),
            manager.config_dir(),
            &manager.candidates_path(),
            ctx.now,
        )
        .await?;

    partition(ctx, &manager, args.prefix.as_deref(), console)
}

/// Rebuild the per-user lists from the existing CandidateList
pub fn partition_files(ctx: &Context<'_>, args: &PartitionArgs, console: &mut Console<'_>) -> Result<()> {
    let manager = open_target(&args.target)?;
    // Validates the config even though partitioning needs none of it.
    manager.load_settings(ctx.identity)?;
    partition(ctx, &manager, args.prefix.as_deref(), console)
}

fn partition(ctx: &Context<'_>, manager: &ConfigManager, prefix: Option<&str>, console: &mut Console<'_>) -> Result<()> {
    let summary = partition_candidates(&manager.candidates_path(), &manager.user_cache(), prefix, ctx.metrics)?;
    writeln!(
        console.out,
        "{} files not accessed recently, owned by {} users",
        summary.partitioned, summary.owners
    )?;
    Ok(())
}

fn window_for(manager: &ConfigManager, settings: &Settings) -> Result<DeletionWindow> {
    DeletionWindow::from_candidates(&manager.candidates_path(), settings)
}

fn lapsed_notice(window: &DeletionWindow, err: &mut dyn Write) -> Result<()> {
    writeln!(err, "Scheduled deletion would have occurred on {}", window.deletion_datestr())?;
    Ok(())
}

fn require_cache(manager: &ConfigManager) -> Result<()> {
    let cache = manager.user_cache();
    if !cache.exists() {
        return Err(ExpireError::UserCacheMissing(cache.dir().to_path_buf()).into());
    }
    Ok(())
}

/// Mail the administrator summary and each real user's notice
pub async fn notify_users(ctx: &Context<'_>, args: &ScopedArgs, console: &mut Console<'_>) -> Result<()> {
    let manager = open_target(&args.target)?;
    let settings = manager.load_settings(ctx.identity)?;

    let window = window_for(&manager, &settings)?;
    if window.has_lapsed(ctx.now) {
        return lapsed_notice(&window, console.err);
    }
    require_cache(&manager)?;

    let cache = manager.user_cache();
    let classifier = Classifier::new(&settings.exemptions);
    let mut records: Vec<UserCountRecord> = Vec::new();

    match &args.user {
        Some(user) => {
            let uid = resolve_uid(ctx.identity, user, false).ok_or_else(|| ExpireError::UnknownUser(user.clone()))?;
            let Some(list) = cache.list_for(uid) else {
                writeln!(console.out, "User {} has no files to delete", user)?;
                return Ok(());
            };
            classifier.append_user_file_counts(&mut records, &list, ctx.identity)?;
        }
        None => {
            for list in cache.lists()? {
                classifier.append_user_file_counts(&mut records, &list, ctx.identity)?;
            }
        }
    }

    let smtp;
    let mailer: &dyn Mailer = match ctx.mailer {
        Some(mailer) => mailer,
        None => {
            smtp = SmtpMailer::new(&settings);
            &smtp
        }
    };

    let request = NotifyRequest {
        dirname: args.target.dirname.as_str(),
        dir_path: manager.target_dir(),
        window,
        user_command: format!("{} list {}", ctx.program, manager.target_dir()),
        check: args.check,
    };

    let report = Notifier::new(&settings, ctx.identity, mailer, ctx.metrics)
        .with_mail_delay(ctx.mail_delay)
        .notify(&records, &request, console.out)
        .await?;

    if report.admin_notified {
        writeln!(
            console.out,
            "Notified {} and {} users of deletion on {}",
            settings.admin_email,
            report.users_notified.len(),
            window.deletion_datestr()
        )?;
    }
    Ok(())
}

/// Delete everything the classifier marks for deletion
pub fn remove_files(ctx: &Context<'_>, args: &ScopedArgs, console: &mut Console<'_>) -> Result<()> {
    let manager = open_target(&args.target)?;
    let settings = manager.load_settings(ctx.identity)?;

    if !manager.candidates_path().exists() {
        return Err(ExpireError::CandidatesMissing.into());
    }
    require_cache(&manager)?;
    let cache = manager.user_cache();

    let scope = match &args.user {
        Some(user) => {
            let uid = resolve_uid(ctx.identity, user, false).ok_or_else(|| ExpireError::UnknownUser(user.clone()))?;
            if cache.list_for(uid).is_none() {
                writeln!(console.out, "User {} has no files to delete", user)?;
                return Ok(());
            }
            Scope::User(uid)
        }
        None => Scope::AllUsers,
    };

    if args.check {
        writeln!(console.out, "-- CHECKING --")?;
    }

    let classifier = Classifier::new(&settings.exemptions);
    let summary = Remover::new(&settings, ctx.metrics, args.check).remove(
        &classifier,
        &cache,
        scope,
        &manager.audit_path(),
        console.out,
        ctx.now,
    )?;

    if !args.check {
        writeln!(
            console.out,
            "Removed {} files ({} accessed since the scan were kept)",
            summary.deleted, summary.retained
        )?;
    }
    Ok(())
}

/// Whose files `list` shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope<'a> {
    /// The caller's own files
    Own(u32),
    /// A user named by an administrator, by login name or id
    Named(&'a str),
    All,
}

/// Print the files due for deletion, or the excepted ones
pub fn list_files(ctx: &Context<'_>, args: &ListArgs, scope: ListScope<'_>, console: &mut Console<'_>) -> Result<()> {
    let manager = open_target(&args.target)?;
    if !manager.candidates_path().exists() {
        writeln!(console.out, "There are no files to delete. No find has been run.")?;
        return Ok(());
    }
    let settings = manager.load_settings(ctx.identity)?;

    let window = window_for(&manager, &settings)?;
    if window.has_lapsed(ctx.now) {
        return lapsed_notice(&window, console.err);
    }
    if args.check {
        writeln!(
            console.out,
            "Scheduled deletion should occur around {}",
            format_date(window.deletion_date)
        )?;
        return Ok(());
    }
    require_cache(&manager)?;
    let cache = manager.user_cache();

    let scope = match scope {
        ListScope::Own(uid) => Scope::User(uid),
        ListScope::Named(user) => Scope::User(
            resolve_uid(ctx.identity, user, true).ok_or_else(|| ExpireError::UnknownUser(user.to_string()))?,
        ),
        ListScope::All => Scope::AllUsers,
    };
    if let Scope::User(uid) = scope {
        if cache.list_for(uid).is_none() {
            writeln!(console.err, "No files to delete for uid {}", uid)?;
            return Ok(());
        }
    }

    let classifier = Classifier::new(&settings.exemptions);
    let files = if args.exceptions {
        classifier.files_to_except(&cache, scope)?
    } else {
        classifier.files_to_delete(&cache, scope)?
    };

    for path in files {
        let path = path?;
        console
            .out
            .write_all(path.as_os_str().as_bytes())
            .and_then(|()| console.out.write_all(b"\n"))
            .context("Failed to write file listing")?;
    }
    Ok(())
}
