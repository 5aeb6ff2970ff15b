use crate::error::SettingsError;
use chrono::{DateTime, Datelike, DurationRound, NaiveDate, TimeZone, Timelike, Utc};
use std::fmt;
use std::time::Duration;

/// Field-quantized trigger derived from a purchase interval
///
/// Intervals of an hour or more keep only whole hours (or whole days), so
/// 90 minutes becomes every hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSchedule {
    EverySeconds(u32),
    EveryMinutes(u32),
    EveryHours(u32),
    EveryDays(u32),
}

/// Map a purchase interval in minutes to a trigger schedule
///
/// | interval          | schedule                    |
/// |-------------------|-----------------------------|
/// | 0 < i < 1         | round(i * 60) seconds (>= 1) |
/// | 1 <= i < 60       | round(i) minutes            |
/// | 60 <= i < 1440    | floor(i / 60) hours         |
/// | i >= 1440         | floor(i / 1440) days        |
pub fn translate(interval_minutes: f64) -> Result<TriggerSchedule, SettingsError> {
    if !interval_minutes.is_finite() || interval_minutes <= 0.0 {
        return Err(SettingsError::InvalidInterval(interval_minutes));
    }

    let schedule = if interval_minutes < 1.0 {
        let seconds = (interval_minutes * 60.0).round() as u32;
        TriggerSchedule::EverySeconds(seconds.max(1))
    } else if interval_minutes < 60.0 {
        TriggerSchedule::EveryMinutes(interval_minutes.round() as u32)
    } else if interval_minutes < 1440.0 {
        TriggerSchedule::EveryHours((interval_minutes / 60.0).floor() as u32)
    } else {
        TriggerSchedule::EveryDays((interval_minutes / 1440.0).floor() as u32)
    };

    Ok(schedule)
}

impl TriggerSchedule {
    /// Fixed spacing between fires
    pub fn period(&self) -> Duration {
        let seconds = match *self {
            TriggerSchedule::EverySeconds(n) => u64::from(n),
            TriggerSchedule::EveryMinutes(n) => u64::from(n) * 60,
            TriggerSchedule::EveryHours(n) => u64::from(n) * 3600,
            TriggerSchedule::EveryDays(n) => u64::from(n) * 86_400,
        };
        Duration::from_secs(seconds)
    }

    /// Cron-style rendering (six fields for seconds, five otherwise)
    pub fn cron_expression(&self) -> String {
        match *self {
            TriggerSchedule::EverySeconds(n) => format!("*/{} * * * * *", n),
            TriggerSchedule::EveryMinutes(n) => format!("*/{} * * * *", n),
            TriggerSchedule::EveryHours(n) => format!("0 */{} * * *", n),
            TriggerSchedule::EveryDays(n) => format!("0 0 */{} * *", n),
        }
    }

    /// Next instant strictly after `now` that the cron expression matches
    ///
    /// Step fields restart at every enclosing boundary: `*/40` minutes fires
    /// at :00 and :40, `*/3` days fires on the 1st, 4th, 7th...
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            TriggerSchedule::EverySeconds(n) => {
                let minute = now.duration_trunc(chrono::Duration::minutes(1)).unwrap_or(now);
                match next_slot(now.second(), n, 0, 60) {
                    Some(second) => minute + chrono::Duration::seconds(i64::from(second)),
                    None => minute + chrono::Duration::minutes(1),
                }
            }
            TriggerSchedule::EveryMinutes(n) => {
                let hour = now.duration_trunc(chrono::Duration::hours(1)).unwrap_or(now);
                match next_slot(now.minute(), n, 0, 60) {
                    Some(minute) => hour + chrono::Duration::minutes(i64::from(minute)),
                    None => hour + chrono::Duration::hours(1),
                }
            }
            TriggerSchedule::EveryHours(n) => {
                let day = start_of_day(now.date_naive());
                match next_slot(now.hour(), n, 0, 24) {
                    Some(hour) => day + chrono::Duration::hours(i64::from(hour)),
                    None => day + chrono::Duration::days(1),
                }
            }
            TriggerSchedule::EveryDays(n) => {
                let today = now.date_naive();
                let this_month = next_slot(today.day(), n, 1, 32)
                    .and_then(|day| NaiveDate::from_ymd_opt(today.year(), today.month(), day));
                match this_month {
                    Some(date) => start_of_day(date),
                    None => start_of_day(first_of_next_month(today)),
                }
            }
        }
    }
}

impl fmt::Display for TriggerSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n, unit) = match *self {
            TriggerSchedule::EverySeconds(n) => (n, "second"),
            TriggerSchedule::EveryMinutes(n) => (n, "minute"),
            TriggerSchedule::EveryHours(n) => (n, "hour"),
            TriggerSchedule::EveryDays(n) => (n, "day"),
        };
        if n == 1 {
            write!(f, "every {}", unit)
        } else {
            write!(f, "every {} {}s", n, unit)
        }
    }
}

/// Smallest `start + k * step` greater than `current` and below `limit`
fn next_slot(current: u32, step: u32, start: u32, limit: u32) -> Option<u32> {
    let step = step.max(1);
    let mut slot = start;
    while slot < limit {
        if slot > current {
            return Some(slot);
        }
        slot += step;
    }
    None
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}
