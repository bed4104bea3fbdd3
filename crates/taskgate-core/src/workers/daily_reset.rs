use std::sync::Arc;

use tracing::{info, warn};

use super::{WorkContext, WorkOutcome, Worker};
use crate::clock::Clock;
use crate::day::DayBoundary;
use crate::error::Result;
use crate::task::TaskStore;

/// Reopens daily tasks left over from a previous local day.
///
/// The candidate query is bounded by the start of today and a reset moves
/// the deadline into today, so running again before the next midnight finds
/// nothing to do.
pub struct DailyTaskResetWorker {
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    day: DayBoundary,
}

impl DailyTaskResetWorker {
    pub fn new(tasks: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, day: DayBoundary) -> Self {
        Self { tasks, clock, day }
    }

    /// Reset every stale daily task. Returns how many were reset.
    pub fn reset(&self) -> Result<usize> {
        let start_of_today = self.day.start_of_day(self.clock.now());
        let stale = self.tasks.daily_tasks_needing_reset(start_of_today)?;
        let count = stale.len();
        for mut task in stale {
            task.reset_for_day(start_of_today);
            self.tasks.update(&task)?;
        }
        Ok(count)
    }
}

impl Worker for DailyTaskResetWorker {
    fn name(&self) -> &'static str {
        "daily-reset"
    }

    fn run(&self, ctx: &WorkContext) -> WorkOutcome {
        match self.reset() {
            Ok(count) => {
                info!(reset = count, "daily tasks reset");
                WorkOutcome::Success
            }
            Err(e) => {
                warn!(attempt = ctx.attempt, error = %e, "daily reset failed");
                WorkOutcome::Retry
            }
        }
    }
}
