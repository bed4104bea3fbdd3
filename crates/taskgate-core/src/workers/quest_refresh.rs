use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::{WorkContext, WorkOutcome, Worker};
use crate::clock::Clock;
use crate::day::{date_key, DayBoundary};
use crate::error::CoreError;
use crate::quest::QuestBoard;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuestRefreshSummary {
    pub expired: u64,
    pub daily_created: u64,
    pub chain_created: u64,
}

/// Cleans up expired quests and generates the current day's and week's.
///
/// The weekly chain is attempted on every run, not only on Mondays, so a
/// missed trigger on the first day of the week is caught up later. Each step
/// runs even when an earlier one failed; all of them are idempotent.
pub struct QuestRefreshWorker {
    quests: Arc<dyn QuestBoard>,
    clock: Arc<dyn Clock>,
    day: DayBoundary,
    daily_titles: Vec<String>,
    chain_titles: Vec<String>,
    max_attempts: u32,
}

impl QuestRefreshWorker {
    pub fn new(
        quests: Arc<dyn QuestBoard>,
        clock: Arc<dyn Clock>,
        day: DayBoundary,
        daily_titles: Vec<String>,
        chain_titles: Vec<String>,
    ) -> Self {
        Self {
            quests,
            clock,
            day,
            daily_titles,
            chain_titles,
            max_attempts: 3,
        }
    }

    /// Attempt after which a failing refresh is reported as terminal.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Run every step; returns the summary of what succeeded and the first
    /// error, if any.
    pub fn refresh(&self) -> (QuestRefreshSummary, Option<CoreError>) {
        let now = self.clock.now();
        let mut summary = QuestRefreshSummary::default();
        let mut first_error = None;

        match self.quests.cleanup_expired(now) {
            Ok(n) => summary.expired = n,
            Err(e) => first_error = first_error.or(Some(e)),
        }

        let today = date_key(self.day.date_of(now));
        match self
            .quests
            .generate_daily(&today, &self.daily_titles, self.day.end_of_day(now))
        {
            Ok(n) => summary.daily_created = n,
            Err(e) => first_error = first_error.or(Some(e)),
        }

        let week = self.day.week_key(now);
        match self
            .quests
            .generate_weekly_chain(&week, &self.chain_titles, self.day.end_of_week(now))
        {
            Ok(n) => summary.chain_created = n,
            Err(e) => first_error = first_error.or(Some(e)),
        }

        (summary, first_error)
    }
}

impl Worker for QuestRefreshWorker {
    fn name(&self) -> &'static str {
        "quests"
    }

    fn run(&self, ctx: &WorkContext) -> WorkOutcome {
        match self.refresh() {
            (summary, None) => {
                info!(
                    expired = summary.expired,
                    daily = summary.daily_created,
                    chain = summary.chain_created,
                    "quests refreshed"
                );
                WorkOutcome::Success
            }
            (_, Some(e)) if ctx.attempt < self.max_attempts => {
                warn!(attempt = ctx.attempt, error = %e, "quest refresh failed; will retry");
                WorkOutcome::Retry
            }
            (_, Some(e)) => {
                warn!(attempt = ctx.attempt, error = %e, "quest refresh failed; giving up");
                WorkOutcome::Failure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{DatabaseError, Result};
    use crate::quest::Quest;
    use crate::storage::Database;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn titles(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn wednesday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap()
    }

    fn worker(board: Arc<dyn QuestBoard>, clock: Arc<ManualClock>) -> QuestRefreshWorker {
        QuestRefreshWorker::new(
            board,
            clock,
            DayBoundary::utc(),
            titles(&["daily a", "daily b"]),
            titles(&["plan", "execute", "review"]),
        )
    }

    #[test]
    fn missed_monday_still_generates_chain() {
        let db = Arc::new(Database::open_memory().unwrap());
        let clock = Arc::new(ManualClock::new(wednesday(), std::time::Duration::ZERO));
        let worker = worker(db.clone(), clock);

        let (summary, err) = worker.refresh();
        assert!(err.is_none());
        assert_eq!(summary.daily_created, 2);
        assert_eq!(summary.chain_created, 3);

        let (again, _) = worker.refresh();
        assert_eq!(again, QuestRefreshSummary::default());
    }

    #[test]
    fn next_day_expires_yesterdays_dailies() {
        let db = Arc::new(Database::open_memory().unwrap());
        let clock = Arc::new(ManualClock::new(wednesday(), std::time::Duration::ZERO));
        let worker = worker(db.clone(), clock.clone());
        worker.refresh();

        clock.advance(std::time::Duration::from_secs(24 * 3600));
        let (summary, _) = worker.refresh();
        assert_eq!(summary.expired, 2);
        assert_eq!(summary.daily_created, 2);
        assert_eq!(summary.chain_created, 0);
        assert_eq!(db.list_quests().unwrap().len(), 5);
    }

    /// Daily generation always fails; counts chain attempts.
    #[derive(Default)]
    struct BrokenDaily {
        chain_calls: AtomicU32,
    }

    impl QuestBoard for BrokenDaily {
        fn cleanup_expired(&self, _: DateTime<Utc>) -> Result<u64> {
            Ok(0)
        }
        fn generate_daily(&self, _: &str, _: &[String], _: DateTime<Utc>) -> Result<u64> {
            Err(DatabaseError::Locked.into())
        }
        fn generate_weekly_chain(&self, _: &str, titles: &[String], _: DateTime<Utc>) -> Result<u64> {
            self.chain_calls.fetch_add(1, Ordering::SeqCst);
            Ok(titles.len() as u64)
        }
        fn list_quests(&self) -> Result<Vec<Quest>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn failures_retry_then_give_up_at_bound() {
        let board = Arc::new(BrokenDaily::default());
        let clock = Arc::new(ManualClock::new(wednesday(), std::time::Duration::ZERO));
        let worker = worker(board.clone(), clock);

        assert_eq!(worker.run(&WorkContext { attempt: 1 }), WorkOutcome::Retry);
        assert_eq!(worker.run(&WorkContext { attempt: 2 }), WorkOutcome::Retry);
        assert_eq!(worker.run(&WorkContext { attempt: 3 }), WorkOutcome::Failure);
        // The chain was still attempted on every run.
        assert_eq!(board.chain_calls.load(Ordering::SeqCst), 3);
    }
}
