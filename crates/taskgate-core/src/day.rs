//! Local-day arithmetic anchored to an explicit UTC offset.
//!
//! "Local midnight" is never taken from the host: the offset comes from
//! configuration (`day.utc_offset_minutes`) so every worker and query agrees
//! on where one day ends and the next begins.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use crate::error::ConfigError;

/// Day boundaries in a fixed timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl DayBoundary {
    /// Build from an offset in minutes east of UTC.
    ///
    /// # Errors
    /// Returns an error when the offset is outside ±24h.
    pub fn from_offset_minutes(minutes: i32) -> Result<Self, ConfigError> {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "day.utc_offset_minutes".to_string(),
                message: format!("{minutes} is not a valid UTC offset"),
            })?;
        Ok(Self { offset })
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Calendar date of `ts` in this timezone.
    pub fn date_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.offset).date_naive()
    }

    /// Instant at which `date` begins.
    pub fn start_of(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        // Fixed offsets have no gaps or folds, so the mapping is unique.
        self.offset
            .from_local_datetime(&midnight)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
    }

    /// Start of the local day containing `now`.
    pub fn start_of_day(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of(self.date_of(now))
    }

    /// `[start, end)` of the local day before the one containing `now`.
    pub fn yesterday(&self, now: DateTime<Utc>) -> (NaiveDate, DateTime<Utc>, DateTime<Utc>) {
        let today = self.date_of(now);
        let yesterday = today.pred_opt().unwrap_or(today);
        (yesterday, self.start_of(yesterday), self.start_of(today))
    }

    /// End of the local day containing `now` (start of the next day).
    pub fn end_of_day(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of_day(now) + Duration::days(1)
    }

    pub fn same_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.date_of(a) == self.date_of(b)
    }

    /// ISO week key such as `2026-W42` for the local date of `now`.
    pub fn week_key(&self, now: DateTime<Utc>) -> String {
        let week = self.date_of(now).iso_week();
        format!("{}-W{:02}", week.year(), week.week())
    }

    /// Start of the next ISO week (Monday 00:00 local) after `now`.
    pub fn end_of_week(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.date_of(now);
        let days_left = 7 - i64::from(date.weekday().num_days_from_monday());
        self.start_of(date + Duration::days(days_left))
    }
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::utc()
    }
}

/// Date key used for per-day records (`YYYY-MM-DD`).
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
