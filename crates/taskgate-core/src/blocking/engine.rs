use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bonus::{is_exempt, BonusManager, Exemption};
use crate::clock::Clock;
use crate::error::Result;
use crate::penalty::PenaltyManager;
use crate::task::{Task, TaskStore};

/// Why the engine reached its verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum BlockReason {
    /// No incomplete non-daily task exists
    NoPendingTasks,
    /// A penalty window is running
    PenaltyActive { until: Option<DateTime<Utc>> },
    /// Hard tasks past their deadline
    HardTaskOverdue { task_ids: Vec<String> },
    /// Tasks past their deadline (after grace)
    TaskOverdue { task_ids: Vec<String> },
    /// Tasks pending but nothing overdue
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub blocked: bool,
    pub reason: BlockReason,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Leeway before a non-hard task counts as overdue
    pub soft_grace: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            soft_grace: chrono::Duration::zero(),
        }
    }
}

/// Stateless evaluator of the blocking policy.
///
/// Holds only shared handles; every call reads current state, so the engine
/// can be shared across threads and called from any enforcement path.
pub struct DecisionEngine {
    tasks: Arc<dyn TaskStore>,
    penalty: Arc<PenaltyManager>,
    bonus: Arc<BonusManager>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl DecisionEngine {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        penalty: Arc<PenaltyManager>,
        bonus: Arc<BonusManager>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            tasks,
            penalty,
            bonus,
            clock,
            config,
        }
    }

    /// Whether distracting apps and sites must be blocked now.
    ///
    /// # Errors
    /// Store failures propagate; they never read as "not blocked".
    pub fn is_blocked(&self) -> Result<bool> {
        Ok(self.evaluate()?.blocked)
    }

    /// Evaluate the policy and report the deciding reason.
    ///
    /// Checks short-circuit in severity order: no pending work, penalty,
    /// hard-task violations, plain overdue tasks.
    pub fn evaluate(&self) -> Result<Verdict> {
        let now = self.clock.now();
        let verdict = |blocked, reason| Verdict {
            blocked,
            reason,
            evaluated_at: now,
        };

        if self.tasks.count_all_incomplete_non_daily_tasks()? == 0 {
            debug!("not blocked: no pending tasks");
            return Ok(verdict(false, BlockReason::NoPendingTasks));
        }

        let penalty = self.penalty.status()?;
        if penalty.active {
            debug!(until = ?penalty.until, "blocked: penalty active");
            return Ok(verdict(
                true,
                BlockReason::PenaltyActive {
                    until: penalty.until,
                },
            ));
        }

        let mut exemptions = None;

        let hard = self.tasks.tasks_violating_hardness(now)?;
        let hard_ids = self.unexempted(hard, &mut exemptions, now)?;
        if !hard_ids.is_empty() {
            debug!(count = hard_ids.len(), "blocked: hard tasks overdue");
            return Ok(verdict(true, BlockReason::HardTaskOverdue { task_ids: hard_ids }));
        }

        let overdue = self.tasks.overdue_incomplete(now - self.config.soft_grace)?;
        let overdue_ids = self.unexempted(overdue, &mut exemptions, now)?;
        if !overdue_ids.is_empty() {
            debug!(count = overdue_ids.len(), "blocked: tasks overdue");
            return Ok(verdict(true, BlockReason::TaskOverdue { task_ids: overdue_ids }));
        }

        debug!("not blocked: pending tasks within deadline");
        Ok(verdict(false, BlockReason::Clear))
    }

    /// Ids of `tasks` not covered by an active exemption. Exemptions are read
    /// at most once per evaluation, and only when there is something to filter.
    fn unexempted(
        &self,
        tasks: Vec<Task>,
        exemptions: &mut Option<Vec<Exemption>>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        if exemptions.is_none() {
            *exemptions = Some(self.bonus.active_exemptions_at(now)?);
        }
        let active = exemptions.as_deref().unwrap_or_default();
        Ok(tasks
            .into_iter()
            .filter(|task| !is_exempt(task, active))
            .map(|task| task.id)
            .collect())
    }
}
