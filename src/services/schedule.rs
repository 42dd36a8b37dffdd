//! Example crontab entries for the find / notify / remove cycle.
//!
//! Days are kept at or below 28 so the entries fire in every month.

use crate::services::notifier::add_calendar_days;
use chrono::{DateTime, Datelike, Local};

const CRON_MINUTE: u32 = 11;
const CRON_HOUR: u32 = 2;
const LAST_SAFE_DAY: u32 = 28;

/// Days of the month for each phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronDays {
    pub find: u32,
    pub notify: u32,
    pub remove: u32,
}

fn wrap(day: u32) -> u32 {
    if day > LAST_SAFE_DAY { 1 } else { day }
}

/// Pick days from the last scan, or default to a scan on the 1st.
pub fn cron_days(scanned_at: Option<DateTime<Local>>, notify_days: u32) -> CronDays {
    let (find, remove) = match scanned_at {
        Some(scanned_at) => {
            let deletion = add_calendar_days(scanned_at, notify_days);
            (scanned_at.day(), deletion.day())
        }
        None => (1, 1 + notify_days),
    };

    CronDays {
        find,
        notify: wrap(find + 1),
        remove: wrap(remove),
    }
}

/// Crontab lines invoking `program` against `dir`
pub fn crontab_lines(program: &str, dir: &str, days: CronDays) -> Vec<String> {
    [("find", days.find), ("notify", days.notify), ("remove", days.remove)]
        .iter()
        .map(|(command, day)| {
            format!(
                "{} {} {} * * {} {} {}",
                CRON_MINUTE, CRON_HOUR, day, program, command, dir
            )
        })
        .collect()
}
