// Wall-clock fire times
//
// Each one-shot timer recomputes its next fire time from the current clock
// every time it re-arms, so restarts and slow jobs do not drift the schedule.
// All times are UTC.

use super::JobType;
use crate::config::MaintenanceConfig;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// The self re-arming calendar timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timer {
    Daily,
    Weekly,
    Monthly,
}

impl Timer {
    pub const ALL: [Timer; 3] = [Timer::Daily, Timer::Weekly, Timer::Monthly];

    /// Job fired by this timer
    pub fn job(&self) -> JobType {
        match self {
            Timer::Daily => JobType::Consolidate,
            Timer::Weekly => JobType::Summarize,
            Timer::Monthly => JobType::Reindex,
        }
    }

    /// Next fire time strictly after `now`
    pub fn next_fire(&self, now: DateTime<Utc>, config: &MaintenanceConfig) -> Option<DateTime<Utc>> {
        match self {
            Timer::Daily => next_daily(now, config.daily_hour),
            Timer::Weekly => next_weekly(now, config.weekly_weekday, config.weekly_hour),
            Timer::Monthly => next_monthly(now, config.monthly_day, config.monthly_hour),
        }
    }
}

fn at_hour(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = date.and_time(NaiveTime::MIN) + Duration::hours(hour.min(23) as i64);
    time.and_utc()
}

/// Next `hour`:00 after `now`
pub fn next_daily(now: DateTime<Utc>, hour: u32) -> Option<DateTime<Utc>> {
    let today = at_hour(now.date_naive(), hour);
    if today > now {
        Some(today)
    } else {
        Some(today + Duration::days(1))
    }
}

/// Next `weekday` (days from Sunday) at `hour`:00 after `now`
pub fn next_weekly(now: DateTime<Utc>, weekday: u32, hour: u32) -> Option<DateTime<Utc>> {
    let today = now.weekday().num_days_from_sunday();
    let days_ahead = (weekday % 7 + 7 - today) % 7;
    let candidate = at_hour(now.date_naive() + Duration::days(days_ahead as i64), hour);
    if candidate > now {
        Some(candidate)
    } else {
        Some(candidate + Duration::days(7))
    }
}

/// Next `day` of the month at `hour`:00 after `now`
///
/// Days past the end of a short month fall on its last day.
pub fn next_monthly(now: DateTime<Utc>, day: u32, hour: u32) -> Option<DateTime<Utc>> {
    let this_month = month_day(now.year(), now.month(), day)?;
    let candidate = at_hour(this_month, hour);
    if candidate > now {
        return Some(candidate);
    }

    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Some(at_hour(month_day(year, month, day)?, hour))
}

fn month_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = next_first.pred_opt()?.day();
    first.with_day(day.clamp(1, last))
}
