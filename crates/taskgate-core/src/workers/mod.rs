//! Scheduled maintenance workers.
//!
//! Each worker is a unit of at-least-once work: it may run late, twice, or
//! after a batch of missed triggers, and must leave the same state as one
//! timely run. A worker reports [`WorkOutcome`]; the [`WorkScheduler`]
//! decides whether and when to call it again.

mod contribution;
mod daily_reset;
mod quest_refresh;
mod reminder;
mod scheduler;

pub use contribution::{ContributionResult, MidnightContributionWorker};
pub use daily_reset::DailyTaskResetWorker;
pub use quest_refresh::{QuestRefreshSummary, QuestRefreshWorker};
pub use reminder::{ReminderSummary, ReminderWorker};
pub use scheduler::{RetryPolicy, WorkReport, WorkScheduler};

use serde::{Deserialize, Serialize};

/// Per-invocation context handed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkContext {
    /// 1-based attempt number within the current scheduling round
    pub attempt: u32,
}

impl WorkContext {
    pub fn first() -> Self {
        Self { attempt: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOutcome {
    Success,
    /// Transient failure; run again later
    Retry,
    /// Terminal for this round; state was left consistent
    Failure,
}

pub trait Worker: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &WorkContext) -> WorkOutcome;
}
