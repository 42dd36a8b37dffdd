//! Owner and administrator notification.
//!
//! A run has one deletion date: the CandidateList's modification time plus
//! the notice period. Once that date has passed, notification (and listing)
//! is refused as a soft no-op.

use crate::error::ExpireError;
use crate::metrics::Metrics;
use crate::models::{Settings, UserCategory, UserCountRecord};
use crate::services::identity::IdentityDb;
use crate::services::mailer::Mailer;
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{DateTime, Days, Local};
use regex::{Captures, Regex};
use std::fs;
use std::io::Write;
use std::time::Duration;

/// Pause between personal messages so the relay does not throttle us
pub const MAIL_DELAY: Duration = Duration::from_secs(10);

/// Display format of deletion dates, e.g. `Mon 09 March 2026`
pub const DATE_FORMAT: &str = "%a %d %B %Y";

pub fn format_date(date: DateTime<Local>) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// `start` moved forward by `days` calendar days at the same local time.
///
/// Falls back to whole 24-hour days when that local time does not exist on
/// the target date.
pub fn add_calendar_days(start: DateTime<Local>, days: u32) -> DateTime<Local> {
    start
        .checked_add_days(Days::new(u64::from(days)))
        .unwrap_or_else(|| start + chrono::Duration::days(i64::from(days)))
}

/// The scheduled deletion date of the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionWindow {
    pub scanned_at: DateTime<Local>,
    pub deletion_date: DateTime<Local>,
}

impl DeletionWindow {
    pub fn new(scanned_at: DateTime<Local>, settings: &Settings) -> Self {
        Self {
            scanned_at,
            deletion_date: add_calendar_days(scanned_at, settings.notify_days),
        }
    }

    /// Window from the CandidateList's modification time
    pub fn from_candidates(candidates: &Utf8Path, settings: &Settings) -> Result<Self> {
        if !candidates.exists() {
            return Err(ExpireError::CandidatesMissing.into());
        }
        let modified = fs::metadata(candidates)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to read modification time of {}", candidates))?;
        Ok(Self::new(DateTime::<Local>::from(modified), settings))
    }

    /// True once `now` is past the deletion date
    pub fn has_lapsed(&self, now: DateTime<Local>) -> bool {
        now > self.deletion_date
    }

    pub fn deletion_datestr(&self) -> String {
        format_date(self.deletion_date)
    }
}

/// Fills `{TOKEN}` placeholders in message templates
pub struct TemplateRenderer {
    token_pattern: Regex,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            token_pattern: Regex::new(r"\{([A-Z_]+)\}").expect("Invalid token regex"),
        }
    }

    /// Substitute known tokens; unknown tokens are left as written
    pub fn render(&self, template: &str, values: &[(&str, &str)]) -> String {
        self.token_pattern
            .replace_all(template, |caps: &Captures<'_>| {
                let token = &caps[1];
                values
                    .iter()
                    .find(|(name, _)| *name == token)
                    .map_or_else(|| caps[0].to_string(), |(_, value)| value.to_string())
            })
            .into_owned()
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Administrator summary: every owner, grouped by category, largest first
pub fn overall_usage_message(records: &[UserCountRecord], deletion_datestr: &str, last_access_days: u32) -> String {
    let mut msg = format!(
        "\nDeletion is scheduled to occur on {deletion_datestr}.\n\n\
         Counts of files that have not been accessed in {last_access_days} days.\n\n\
         User, TotalFileCount DeleteFileCount ExceptedFileCount\n"
    );

    for category in [UserCategory::Real, UserCategory::System, UserCategory::Departed] {
        let heading = category.heading();
        msg.push('\n');
        msg.push_str(heading);
        msg.push('\n');
        msg.push_str(&"-".repeat(heading.len()));
        msg.push('\n');

        let mut group: Vec<&UserCountRecord> = records.iter().filter(|r| r.category == category).collect();
        group.sort_by(|a, b| b.total.cmp(&a.total));
        for record in group {
            msg.push_str(&record.summary_line());
            msg.push('\n');
        }
    }
    msg
}

/// What one notify run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub admin_notified: bool,
    pub users_notified: Vec<String>,
}

/// Inputs that vary per notify run
#[derive(Debug, Clone)]
pub struct NotifyRequest<'a> {
    /// Directory as named on the command line, for the admin subject
    pub dirname: &'a str,
    /// Absolute target directory, for user messages
    pub dir_path: &'a Utf8Path,
    pub window: DeletionWindow,
    /// Command a user can run to review their files
    pub user_command: String,
    pub check: bool,
}

/// Composes and dispatches notification messages
pub struct Notifier<'a> {
    settings: &'a Settings,
    identity: &'a dyn IdentityDb,
    mailer: &'a dyn Mailer,
    metrics: &'a Metrics,
    renderer: TemplateRenderer,
    mail_delay: Duration,
}

impl<'a> Notifier<'a> {
    pub fn new(
        settings: &'a Settings,
        identity: &'a dyn IdentityDb,
        mailer: &'a dyn Mailer,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            settings,
            identity,
            mailer,
            metrics,
            renderer: TemplateRenderer::new(),
            mail_delay: MAIL_DELAY,
        }
    }

    /// Override the pause between personal messages
    pub fn with_mail_delay(mut self, delay: Duration) -> Self {
        self.mail_delay = delay;
        self
    }

    fn config_tokens(&self) -> [(&'static str, String); 5] {
        [
            ("LAST_ACCESS_DAYS", self.settings.last_access_days.to_string()),
            ("NOTIFY_DAYS", self.settings.notify_days.to_string()),
            ("FROM_EMAIL", self.settings.from_email.clone()),
            ("FROM_NAME", self.settings.from_name.clone()),
            ("ADMIN_EMAIL", self.settings.admin_email.clone()),
        ]
    }

    fn render(&self, template: &str, run_tokens: &[(&str, &str)]) -> String {
        let config_tokens = self.config_tokens();
        let mut values: Vec<(&str, &str)> = run_tokens.to_vec();
        values.extend(config_tokens.iter().map(|(k, v)| (*k, v.as_str())));
        self.renderer.render(template, &values)
    }

    pub fn user_subject(&self, deletion_datestr: &str, dir_path: &Utf8Path) -> String {
        self.render(
            &self.settings.user_subject_template,
            &[("DELETE_DATE", deletion_datestr), ("DIR_PATH", dir_path.as_str())],
        )
    }

    pub fn user_message(
        &self,
        record: &UserCountRecord,
        deletion_datestr: &str,
        user_command: &str,
        dir_path: &Utf8Path,
    ) -> String {
        let entry = self.identity.user_by_name(&record.user_name);
        let display_name = entry
            .as_ref()
            .map_or(record.user_name.as_str(), |user| user.display_name());

        self.render(
            &self.settings.user_message_template,
            &[
                ("USERNAME", display_name),
                ("DELETE_DATE", deletion_datestr),
                ("DIR_PATH", dir_path.as_str()),
                ("COMMAND", user_command),
            ],
        )
    }

    /// Send the admin summary and one message per real user.
    ///
    /// In check mode the admin summary is written to `out` and nothing is
    /// mailed.
    pub async fn notify(
        &self,
        records: &[UserCountRecord],
        request: &NotifyRequest<'_>,
        out: &mut dyn Write,
    ) -> Result<NotifyReport> {
        let deletion_datestr = request.window.deletion_datestr();
        let admin_msg = overall_usage_message(records, &deletion_datestr, self.settings.last_access_days);
        let mut report = NotifyReport::default();

        if request.check {
            writeln!(out, "-- CHECKING --")?;
            writeln!(out, "{}", admin_msg)?;
            return Ok(report);
        }

        let subject = format!("{} files cleanup scheduled for {}", request.dirname, deletion_datestr);
        self.mailer.send(&self.settings.admin_email, &subject, &admin_msg)?;
        self.metrics.record_mail_sent();
        report.admin_notified = true;

        for record in records.iter().filter(|r| r.category == UserCategory::Real) {
            if !self.mail_delay.is_zero() {
                tokio::time::sleep(self.mail_delay).await;
            }

            let subject = self.user_subject(&deletion_datestr, request.dir_path);
            let message = self.user_message(record, &deletion_datestr, &request.user_command, request.dir_path);
            self.mailer.send(&record.user_name, &subject, &message)?;
            self.metrics.record_mail_sent();
            report.users_notified.push(record.user_name.clone());
        }

        tracing::info!(
            "Notified {} and {} users of deletion on {}",
            self.settings.admin_email,
            report.users_notified.len(),
            deletion_datestr
        );
        Ok(report)
    }
}
