use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{WorkContext, WorkOutcome, Worker};
use crate::clock::Clock;
use crate::contribution::{ContributionStore, HabitContribution, InsertOutcome, NO_PENDING_TASKS};
use crate::day::DayBoundary;
use crate::error::Result;
use crate::task::TaskStore;

/// What one evaluation of yesterday concluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ContributionResult {
    Recorded(HabitContribution),
    AlreadyRecorded,
    /// Yesterday ended with a backlog; nothing to record
    Backlog { pending: u64, overdue: u64 },
}

/// Records a "clean day" marker for yesterday when it ended with no backlog.
pub struct MidnightContributionWorker {
    tasks: Arc<dyn TaskStore>,
    contributions: Arc<dyn ContributionStore>,
    clock: Arc<dyn Clock>,
    day: DayBoundary,
}

impl MidnightContributionWorker {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        contributions: Arc<dyn ContributionStore>,
        clock: Arc<dyn Clock>,
        day: DayBoundary,
    ) -> Self {
        Self {
            tasks,
            contributions,
            clock,
            day,
        }
    }

    pub fn evaluate_yesterday(&self) -> Result<ContributionResult> {
        let now = self.clock.now();
        let (date, _start, end) = self.day.yesterday(now);

        if self.contributions.contribution_for(date)?.is_some() {
            debug!(%date, "contribution already recorded");
            return Ok(ContributionResult::AlreadyRecorded);
        }

        let pending = self.tasks.count_pending_non_daily_at(end)?;
        let overdue = self.tasks.count_overdue_incomplete_at(end)?;
        if pending > 0 || overdue > 0 {
            return Ok(ContributionResult::Backlog { pending, overdue });
        }

        let contribution = HabitContribution {
            date,
            value: 1,
            reason: NO_PENDING_TASKS.to_string(),
            recorded_at: now,
        };
        Ok(match self.contributions.insert_contribution(&contribution)? {
            InsertOutcome::Inserted => ContributionResult::Recorded(contribution),
            InsertOutcome::AlreadyRecorded => ContributionResult::AlreadyRecorded,
        })
    }
}

impl Worker for MidnightContributionWorker {
    fn name(&self) -> &'static str {
        "contribution"
    }

    fn run(&self, ctx: &WorkContext) -> WorkOutcome {
        match self.evaluate_yesterday() {
            Ok(ContributionResult::Recorded(c)) => {
                info!(date = %c.date, "clean day recorded");
                WorkOutcome::Success
            }
            Ok(ContributionResult::Backlog { pending, overdue }) => {
                info!(pending, overdue, "yesterday ended with a backlog");
                WorkOutcome::Success
            }
            Ok(ContributionResult::AlreadyRecorded) => WorkOutcome::Success,
            Err(e) => {
                warn!(attempt = ctx.attempt, error = %e, "contribution check failed");
                WorkOutcome::Retry
            }
        }
    }
}
