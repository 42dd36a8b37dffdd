//! End-to-end tests for the find / notify / remove / list cycle
//!
//! These tests verify:
//! - Partition completeness against a real traversal
//! - Same-day backup rotation of the CandidateList
//! - Deletion-window gating for notify and list
//! - Audit writes only on full removal
//! - Soft conditions exiting cleanly

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Duration as ChronoDuration, Local};
use expirefiles::cli::commands::{self, Console, Context, ListScope};
use expirefiles::cli::{ListArgs, PartitionArgs, Role, ScopedArgs, TargetArgs, parse_invocation};
use expirefiles::config::ConfigManager;
use expirefiles::error::{EXIT_FAILURE, exit_code_for};
use expirefiles::metrics::Metrics;
use expirefiles::models::{SECS_PER_DAY, UserCategory};
use expirefiles::services::identity::{IdentityDb, UserEntry};
use expirefiles::services::lists::{dated_backup_path, read_list};
use expirefiles::services::Mailer;
use expirefiles::ExpireError;
use std::cell::RefCell;
use std::fs::{self, File, FileTimes};
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Passwd database holding just the user running the tests
struct TestIdentity {
    uid: u32,
}

impl TestIdentity {
    fn current(dir: &Utf8Path) -> Self {
        Self {
            uid: fs::metadata(dir).unwrap().uid(),
        }
    }

    fn entry(&self) -> UserEntry {
        UserEntry {
            name: "tester".to_string(),
            uid: self.uid,
            gecos: "Test User,,,".to_string(),
        }
    }
}

impl IdentityDb for TestIdentity {
    fn user_by_uid(&self, uid: u32) -> Option<UserEntry> {
        (uid == self.uid).then(|| self.entry())
    }

    fn user_by_name(&self, name: &str) -> Option<UserEntry> {
        (name == "tester").then(|| self.entry())
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: RefCell<Vec<(String, String, String)>>,
}

impl Mailer for RecordingMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .borrow_mut()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

struct Fixture {
    _temp_dir: TempDir,
    target: Utf8PathBuf,
    manager: ConfigManager,
    identity: TestIdentity,
}

impl Fixture {
    /// Initialized target with no exemptions, `find` taken from PATH
    fn new() -> Self {
        Self::named("scratch")
    }

    fn named(dir_name: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let target = Utf8PathBuf::try_from(temp_dir.path().join(dir_name)).unwrap();
        fs::create_dir(&target).unwrap();

        let manager = ConfigManager::new(&target).unwrap();
        manager.init().unwrap();
        let mut config = manager.load_config().unwrap();
        config.exceptions.users.clear();
        config.exceptions.paths = vec!["/no-delete/".to_string()];
        config.defaults.last_access_days = 30;
        config.defaults.find_command = "find".to_string();
        manager.save_config(&config).unwrap();

        let identity = TestIdentity::current(&target);
        Self {
            _temp_dir: temp_dir,
            target,
            manager,
            identity,
        }
    }

    fn file(&self, relative: &str, idle_days: u64) -> PathBuf {
        let path = self.target.join(relative).into_std_path_buf();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "data").unwrap();
        set_age(&path, idle_days);
        path
    }

    fn target_args(&self) -> TargetArgs {
        TargetArgs {
            dirname: self.target.clone(),
        }
    }

    fn scoped(&self, check: bool, user: Option<&str>) -> ScopedArgs {
        ScopedArgs {
            target: self.target_args(),
            check,
            user: user.map(str::to_string),
        }
    }

    fn list_args(&self, exceptions: bool, check: bool) -> ListArgs {
        ListArgs {
            target: self.target_args(),
            exceptions,
            check,
        }
    }

    fn find_args(&self, prefix: Option<&str>) -> PartitionArgs {
        PartitionArgs {
            target: self.target_args(),
            prefix: prefix.map(str::to_string),
        }
    }
}

fn set_age(path: &std::path::Path, idle_days: u64) {
    let when = SystemTime::now() - Duration::from_secs(idle_days * SECS_PER_DAY);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_times(FileTimes::new().set_accessed(when).set_modified(when))
        .unwrap();
}

#[derive(Default)]
struct Captured {
    out: Vec<u8>,
    err: Vec<u8>,
}

impl Captured {
    fn console(&mut self) -> Console<'_> {
        Console {
            out: &mut self.out,
            err: &mut self.err,
        }
    }

    fn out(&self) -> String {
        String::from_utf8_lossy(&self.out).into_owned()
    }

    fn err(&self) -> String {
        String::from_utf8_lossy(&self.err).into_owned()
    }
}

async fn find(fixture: &Fixture, metrics: &Metrics) {
    let ctx = Context::new(&fixture.identity, metrics, "expirefiles");
    let mut captured = Captured::default();
    commands::find_files(&ctx, &fixture.find_args(None), &mut captured.console())
        .await
        .unwrap();
}

fn list_entries(path: &Utf8Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = read_list(path).unwrap().map(Result::unwrap).collect();
    entries.sort();
    entries
}

#[tokio::test]
async fn test_find_partitions_stale_files_by_owner() {
    let fixture = Fixture::new();
    let stale = fixture.file("projects/run1/output.dat", 45);
    let kept = fixture.file("projects/no-delete/input.dat", 45);
    fixture.file("projects/run2/fresh.dat", 1);

    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    let mut expected = vec![stale, kept];
    expected.sort();
    assert_eq!(list_entries(&fixture.manager.candidates_path()), expected);

    // The tool's own state is never a candidate
    let cache = fixture.manager.user_cache();
    let lists = cache.lists().unwrap();
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].uid, fixture.identity.uid);
    assert_eq!(list_entries(&lists[0].path), expected);
}

#[tokio::test]
async fn test_find_prunes_state_under_pattern_like_target() {
    let fixture = Fixture::named("lab[1]*");
    let stale = fixture.file("a.dat", 45);
    set_age(fixture.manager.config_path().as_std_path(), 45);

    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    assert_eq!(list_entries(&fixture.manager.candidates_path()), vec![stale]);
}

#[tokio::test]
async fn test_find_twice_same_day_keeps_one_backup() {
    let fixture = Fixture::new();
    fixture.file("old.dat", 45);
    let metrics = Metrics::new();

    find(&fixture, &metrics).await;
    find(&fixture, &metrics).await;
    find(&fixture, &metrics).await;

    let candidates = fixture.manager.candidates_path();
    assert!(dated_backup_path(&candidates, Local::now()).exists());
    let raw_files = fs::read_dir(fixture.manager.config_dir())
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .starts_with("files_to_delete.raw")
        })
        .count();
    assert_eq!(raw_files, 2);
}

#[test]
fn test_partition_applies_prefix() {
    let fixture = Fixture::new();
    let path = fixture.file("data/a.dat", 45);

    let mut file = File::create(fixture.manager.candidates_path()).unwrap();
    expirefiles::services::lists::write_entry(&mut file, &path).unwrap();
    drop(file);

    let metrics = Metrics::new();
    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles");
    let mut captured = Captured::default();
    commands::partition_files(&ctx, &fixture.find_args(Some("/mnt")), &mut captured.console()).unwrap();

    let list = fixture.manager.user_cache().list_for(fixture.identity.uid).unwrap();
    let mut expected = std::ffi::OsString::from("/mnt");
    expected.push(path.as_os_str());
    assert_eq!(list_entries(&list.path), vec![PathBuf::from(expected)]);
    assert!(captured.out().starts_with("1 files"));
}

#[tokio::test]
async fn test_notify_mails_admin_and_real_owner() {
    let fixture = Fixture::new();
    fixture.file("a.dat", 45);
    fixture.file("no-delete/b.dat", 45);
    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    let mailer = RecordingMailer::default();
    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles")
        .with_mailer(&mailer)
        .with_mail_delay(Duration::ZERO);
    let mut captured = Captured::default();
    commands::notify_users(&ctx, &fixture.scoped(false, None), &mut captured.console())
        .await
        .unwrap();

    let sent = mailer.sent.borrow();
    assert_eq!(sent[0].0, "admin");
    assert!(sent[0].1.starts_with(&format!("{} files cleanup scheduled for", fixture.target)));
    assert!(sent[0].2.contains("tester 2 1 1"));

    if UserCategory::from_uid(fixture.identity.uid, true) == UserCategory::Real {
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, "tester");
        assert!(sent[1].2.starts_with("Hi Test User,"));
        assert!(sent[1].2.contains(&format!("expirefiles list {}", fixture.target)));
    } else {
        assert_eq!(sent.len(), 1);
    }
}

#[tokio::test]
async fn test_notify_check_mode_prints_summary() {
    let fixture = Fixture::new();
    fixture.file("a.dat", 45);
    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    let mailer = RecordingMailer::default();
    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles").with_mailer(&mailer);
    let mut captured = Captured::default();
    commands::notify_users(&ctx, &fixture.scoped(true, None), &mut captured.console())
        .await
        .unwrap();

    assert!(mailer.sent.borrow().is_empty());
    assert!(captured.out().starts_with("-- CHECKING --"));
}

#[tokio::test]
async fn test_notify_refused_once_window_lapsed() {
    let fixture = Fixture::new();
    fixture.file("a.dat", 45);
    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    let mut config = fixture.manager.load_config().unwrap();
    config.defaults.notify_days = 7;
    fixture.manager.save_config(&config).unwrap();

    let mailer = RecordingMailer::default();
    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles")
        .with_mailer(&mailer)
        .at(Local::now() + ChronoDuration::days(10));
    let mut captured = Captured::default();
    commands::notify_users(&ctx, &fixture.scoped(false, None), &mut captured.console())
        .await
        .unwrap();

    assert!(mailer.sent.borrow().is_empty());
    assert!(captured.err().starts_with("Scheduled deletion would have occurred on"));

    // A 14 day notice is still open at the same instant
    config.defaults.notify_days = 14;
    fixture.manager.save_config(&config).unwrap();
    let mut captured = Captured::default();
    commands::notify_users(&ctx, &fixture.scoped(true, None), &mut captured.console())
        .await
        .unwrap();
    assert!(captured.err().is_empty());
}

#[tokio::test]
async fn test_notify_unknown_user_fails() {
    let fixture = Fixture::new();
    fixture.file("a.dat", 45);
    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    let mailer = RecordingMailer::default();
    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles").with_mailer(&mailer);
    let mut captured = Captured::default();
    let err = commands::notify_users(&ctx, &fixture.scoped(false, Some("ghost")), &mut captured.console())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "invalid username -> ghost");
    assert_eq!(exit_code_for(&err), EXIT_FAILURE);
}

#[test]
fn test_notify_before_find_fails() {
    let fixture = Fixture::new();
    let metrics = Metrics::new();
    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles");
    let mut captured = Captured::default();

    let err = tokio_test::block_on(commands::notify_users(
        &ctx,
        &fixture.scoped(false, None),
        &mut captured.console(),
    ))
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ExpireError>(),
        Some(ExpireError::CandidatesMissing)
    ));
}

#[tokio::test]
async fn test_remove_for_one_user_writes_no_audit() {
    let fixture = Fixture::new();
    let stale = fixture.file("a.dat", 45);
    let kept = fixture.file("no-delete/b.dat", 45);
    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles");
    let mut captured = Captured::default();
    commands::remove_files(&ctx, &fixture.scoped(false, Some("tester")), &mut captured.console()).unwrap();

    assert!(!stale.exists());
    assert!(kept.exists());
    assert!(!fixture.manager.audit_path().exists());
}

#[tokio::test]
async fn test_full_remove_audits_each_deletion() {
    let fixture = Fixture::new();
    let stale = fixture.file("a.dat", 45);
    let touched = fixture.file("b.dat", 45);
    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    // Accessed again after the scan
    set_age(&touched, 0);

    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles");
    let mut captured = Captured::default();
    commands::remove_files(&ctx, &fixture.scoped(false, None), &mut captured.console()).unwrap();

    assert!(!stale.exists());
    assert!(touched.exists());
    let audit = fs::read_to_string(fixture.manager.audit_path()).unwrap();
    let lines: Vec<&str> = audit.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with(&stale.display().to_string()));
    assert!(captured.out().contains("Removed 1 files (1 accessed since the scan were kept)"));
}

#[tokio::test]
async fn test_remove_check_mode_deletes_nothing() {
    let fixture = Fixture::new();
    let stale = fixture.file("a.dat", 45);
    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles");
    let mut captured = Captured::default();
    commands::remove_files(&ctx, &fixture.scoped(true, None), &mut captured.console()).unwrap();

    assert!(stale.exists());
    assert!(!fixture.manager.audit_path().exists());
    assert!(captured.out().contains(&stale.display().to_string()));
}

#[tokio::test]
async fn test_list_refused_once_window_lapsed() {
    let fixture = Fixture::new();
    let stale = fixture.file("a.dat", 45);
    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    let mut config = fixture.manager.load_config().unwrap();
    config.defaults.notify_days = 7;
    fixture.manager.save_config(&config).unwrap();

    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles").at(Local::now() + ChronoDuration::days(10));
    let mut captured = Captured::default();
    commands::list_files(&ctx, &fixture.list_args(false, false), ListScope::All, &mut captured.console()).unwrap();
    assert!(captured.out().is_empty());
    assert!(captured.err().starts_with("Scheduled deletion would have occurred on"));

    config.defaults.notify_days = 14;
    fixture.manager.save_config(&config).unwrap();
    let mut captured = Captured::default();
    commands::list_files(&ctx, &fixture.list_args(false, false), ListScope::All, &mut captured.console()).unwrap();
    assert!(captured.err().is_empty());
    assert_eq!(captured.out(), format!("{}\n", stale.display()));
}

#[test]
fn test_list_before_find_is_soft() {
    let fixture = Fixture::new();
    let metrics = Metrics::new();
    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles");
    let mut captured = Captured::default();

    commands::list_files(&ctx, &fixture.list_args(false, false), ListScope::All, &mut captured.console()).unwrap();
    assert_eq!(captured.out(), "There are no files to delete. No find has been run.\n");
}

#[tokio::test]
async fn test_list_delete_and_exception_sets() {
    let fixture = Fixture::new();
    let stale = fixture.file("a.dat", 45);
    let kept = fixture.file("no-delete/b.dat", 45);
    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles");
    let own = ListScope::Own(fixture.identity.uid);

    let mut captured = Captured::default();
    commands::list_files(&ctx, &fixture.list_args(false, false), own, &mut captured.console()).unwrap();
    assert_eq!(captured.out(), format!("{}\n", stale.display()));

    let mut captured = Captured::default();
    commands::list_files(&ctx, &fixture.list_args(true, false), ListScope::Named("tester"), &mut captured.console())
        .unwrap();
    assert_eq!(captured.out(), format!("{}\n", kept.display()));

    let mut captured = Captured::default();
    commands::list_files(&ctx, &fixture.list_args(false, true), ListScope::All, &mut captured.console()).unwrap();
    assert!(captured.out().starts_with("Scheduled deletion should occur around"));
}

#[tokio::test]
async fn test_list_numeric_user_without_files() {
    let fixture = Fixture::new();
    fixture.file("a.dat", 45);
    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles");
    let mut captured = Captured::default();
    let departed = (fixture.identity.uid + 1).to_string();
    commands::list_files(
        &ctx,
        &fixture.list_args(false, false),
        ListScope::Named(&departed),
        &mut captured.console(),
    )
    .unwrap();
    assert!(captured.out().is_empty());
    assert!(captured.err().contains("No files to delete"));

    let err = commands::list_files(
        &ctx,
        &fixture.list_args(false, false),
        ListScope::Named("ghost"),
        &mut captured.console(),
    )
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<ExpireError>(), Some(ExpireError::UnknownUser(_))));
}

#[test]
fn test_init_again_suggests_schedule() {
    let fixture = Fixture::new();
    let metrics = Metrics::new();
    let ctx = Context::new(&fixture.identity, &metrics, "/usr/local/bin/expirefiles");

    let mut captured = Captured::default();
    commands::init_files(&ctx, &fixture.target_args(), &mut captured.console()).unwrap();
    let out = captured.out();
    assert!(out.contains("already exists"));
    assert!(out.contains(&format!("11 2 1 * * /usr/local/bin/expirefiles find {}", fixture.target)));
    assert!(out.contains(&format!("11 2 15 * * /usr/local/bin/expirefiles remove {}", fixture.target)));
}

#[tokio::test]
async fn test_run_dispatches_user_list_to_own_files() {
    let fixture = Fixture::new();
    let stale = fixture.file("a.dat", 45);
    let metrics = Metrics::new();
    find(&fixture, &metrics).await;

    let role = Role::User {
        uid: fixture.identity.uid,
    };
    let invocation = parse_invocation(&role, ["expirefiles", "list", fixture.target.as_str()]).unwrap();
    assert!(invocation.log_dir(&role).is_none());

    let ctx = Context::new(&fixture.identity, &metrics, "expirefiles");
    let mut captured = Captured::default();
    commands::run(&ctx, &role, &invocation.command, &mut captured.console())
        .await
        .unwrap();
    assert_eq!(captured.out(), format!("{}\n", stale.display()));

    let admin = parse_invocation(&Role::Admin, ["expirefiles", "list", fixture.target.as_str()]).unwrap();
    assert_eq!(admin.log_dir(&Role::Admin), Some(fixture.manager.log_dir()));
}
