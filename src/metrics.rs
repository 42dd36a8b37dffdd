// Run metrics module
//
// Lightweight counters for one command invocation, logged as a summary on exit

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters for one expirefiles run
///
/// Uses atomic operations so services can record through a shared reference.
#[derive(Debug)]
pub struct Metrics {
    /// Candidate paths written to a PerUserList
    pub files_partitioned: AtomicUsize,

    /// Candidate paths gone by partition time
    pub files_vanished: AtomicUsize,

    /// Distinct owners seen during partitioning
    pub owners_partitioned: AtomicUsize,

    /// Files removed from disk
    pub files_deleted: AtomicUsize,

    /// Files a check-mode removal listed but left in place
    pub files_would_delete: AtomicUsize,

    /// Files skipped at removal because they were accessed since the scan
    pub files_retained: AtomicUsize,

    /// Messages handed to the mail relay
    pub mails_sent: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            files_partitioned: AtomicUsize::new(0),
            files_vanished: AtomicUsize::new(0),
            owners_partitioned: AtomicUsize::new(0),
            files_deleted: AtomicUsize::new(0),
            files_would_delete: AtomicUsize::new(0),
            files_retained: AtomicUsize::new(0),
            mails_sent: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_partitioned(&self) {
        self.files_partitioned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_vanished(&self) {
        self.files_vanished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_owner(&self) {
        self.owners_partitioned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deleted(&self) {
        self.files_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_would_delete(&self) {
        self.files_would_delete.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retained(&self) {
        self.files_retained.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mail_sent(&self) {
        self.mails_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!(
            "Run finished in {:.2}s: {} partitioned across {} owners ({} vanished), {} deleted, {} listed by check, {} retained, {} mails sent",
            self.uptime().as_secs_f64(),
            self.files_partitioned.load(Ordering::Relaxed),
            self.owners_partitioned.load(Ordering::Relaxed),
            self.files_vanished.load(Ordering::Relaxed),
            self.files_deleted.load(Ordering::Relaxed),
            self.files_would_delete.load(Ordering::Relaxed),
            self.files_retained.load(Ordering::Relaxed),
            self.mails_sent.load(Ordering::Relaxed),
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
