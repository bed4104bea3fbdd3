//! Task obligations and the store contract the policy core reads from.
//!
//! A task blocks distracting apps while it is incomplete and overdue. Daily
//! tasks recur: the reset worker reopens them every local day. Hard tasks
//! block the moment their deadline passes, without any grace.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ValidationError};

/// One ordered sub-step of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubStep {
    pub title: String,
    pub done: bool,
}

impl SubStep {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            done: false,
        }
    }
}

/// The last cycle of a daily task closed by a reset, kept so that history
/// queries still see a deadline the user missed before the reset moved it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedCycle {
    pub deadline: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A self-imposed obligation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    pub title: String,
    /// Free-form category label (exemptions can target a category)
    pub category: String,
    /// Absolute deadline; never earlier than `created_at`
    pub deadline: DateTime<Utc>,
    /// Creation time. For daily tasks, the start of the current cycle.
    pub created_at: DateTime<Utc>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    /// Recurs every local day
    pub is_daily: bool,
    /// Blocks unconditionally once overdue
    pub is_hard: bool,
    /// Halfway reminder already delivered for the current cycle
    pub reminder_sent: bool,
    #[serde(default)]
    pub steps: Vec<SubStep>,
    #[serde(default)]
    pub previous_cycle: Option<ClosedCycle>,
}

impl Task {
    /// Create an open task with a fresh identifier.
    pub fn new(
        title: impl Into<String>,
        created_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            category: String::from("general"),
            deadline,
            created_at,
            completed: false,
            completed_at: None,
            is_daily: false,
            is_hard: false,
            reminder_sent: false,
            steps: Vec::new(),
            previous_cycle: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn daily(mut self) -> Self {
        self.is_daily = true;
        self
    }

    pub fn hard(mut self) -> Self {
        self.is_hard = true;
        self
    }

    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps = steps.into_iter().map(SubStep::new).collect();
        self
    }

    /// Check the `deadline >= created_at` invariant.
    ///
    /// # Errors
    /// Returns `InvalidTimeRange` when the deadline precedes creation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.deadline < self.created_at {
            return Err(ValidationError::InvalidTimeRange {
                start: self.created_at,
                end: self.deadline,
            });
        }
        Ok(())
    }

    /// Incomplete and past its deadline at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.deadline < now
    }

    /// Instant halfway between creation and deadline.
    pub fn reminder_midpoint(&self) -> DateTime<Utc> {
        self.created_at + (self.deadline - self.created_at) / 2
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        if !self.completed {
            self.completed = true;
            self.completed_at = Some(now);
        }
    }

    pub fn reopen(&mut self) {
        self.completed = false;
        self.completed_at = None;
    }

    /// Mark a sub-step done. Finishing the last open step completes the task.
    ///
    /// Returns whether the task became complete with this call.
    ///
    /// # Errors
    /// Returns `OutOfBounds` for an unknown step index.
    pub fn complete_step(&mut self, index: usize, now: DateTime<Utc>) -> Result<bool, ValidationError> {
        let len = self.steps.len();
        let step = self.steps.get_mut(index).ok_or(ValidationError::OutOfBounds {
            collection: "steps".to_string(),
            index,
            len,
        })?;
        step.done = true;

        if !self.completed && self.steps.iter().all(|s| s.done) {
            self.complete(now);
            return Ok(true);
        }
        Ok(false)
    }

    /// Reopen a daily task for the day starting at `start_of_today`.
    ///
    /// The deadline moves forward by whole days to its first occurrence at or
    /// after `start_of_today`, keeping the time of day. `created_at` moves by
    /// the same amount so the cycle keeps its original span, and the cycle
    /// being closed is kept in `previous_cycle`.
    pub fn reset_for_day(&mut self, start_of_today: DateTime<Utc>) {
        if self.deadline < start_of_today {
            let behind = start_of_today - self.deadline;
            let mut days = behind.num_days();
            if self.deadline + Duration::days(days) < start_of_today {
                days += 1;
            }
            self.previous_cycle = Some(ClosedCycle {
                deadline: self.deadline,
                completed_at: self.completed_at,
            });
            self.deadline += Duration::days(days);
            self.created_at += Duration::days(days);
        }
        self.reopen();
        self.reminder_sent = false;
        for step in &mut self.steps {
            step.done = false;
        }
    }
}

/// Query contract over persisted tasks.
///
/// Implementations must be safe to call from several threads at once; the
/// decision engine reads through this trait from every enforcement path.
pub trait TaskStore: Send + Sync {
    fn create(&self, task: &Task) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<Task>>;
    fn list(&self) -> Result<Vec<Task>>;
    fn update(&self, task: &Task) -> Result<()>;
    /// Returns whether a row was deleted.
    fn delete(&self, id: &str) -> Result<bool>;

    fn count_all_incomplete_non_daily_tasks(&self) -> Result<u64>;
    /// Incomplete hard tasks whose deadline is before `now`.
    fn tasks_violating_hardness(&self, now: DateTime<Utc>) -> Result<Vec<Task>>;
    /// Incomplete tasks (daily included) whose deadline is before `now`.
    fn overdue_incomplete(&self, now: DateTime<Utc>) -> Result<Vec<Task>>;
    /// Daily tasks whose deadline lies in a day before `start_of_today`.
    fn daily_tasks_needing_reset(&self, start_of_today: DateTime<Utc>) -> Result<Vec<Task>>;
    fn all_incomplete_tasks(&self) -> Result<Vec<Task>>;

    /// Non-daily tasks created before `instant` and not completed by then.
    fn count_pending_non_daily_at(&self, instant: DateTime<Utc>) -> Result<u64>;
    /// Tasks past their deadline and not completed as of `instant`,
    /// including a daily task's closed cycle that was missed by then.
    fn count_overdue_incomplete_at(&self, instant: DateTime<Utc>) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn new_task_is_open() {
        let task = Task::new("Read chapter", t0(), t0() + Duration::hours(2));
        assert!(!task.completed);
        assert!(!task.reminder_sent);
        assert!(task.validate().is_ok());
    }

    #[test]
    fn deadline_before_creation_is_invalid() {
        let task = Task::new("Backwards", t0(), t0() - Duration::minutes(1));
        assert!(matches!(
            task.validate(),
            Err(ValidationError::InvalidTimeRange { .. })
        ));
    }

    #[test]
    fn midpoint_is_halfway() {
        let task = Task::new("Essay", t0(), t0() + Duration::hours(50));
        assert_eq!(task.reminder_midpoint(), t0() + Duration::hours(25));
    }

    #[test]
    fn overdue_only_when_incomplete() {
        let mut task = Task::new("Essay", t0(), t0() + Duration::hours(1));
        let later = t0() + Duration::hours(2);
        assert!(task.is_overdue(later));
        task.complete(later);
        assert!(!task.is_overdue(later));
    }

    #[test]
    fn completing_last_step_completes_task() {
        let mut task = Task::new("Laundry", t0(), t0() + Duration::hours(3))
            .with_steps(["wash", "dry"]);
        assert!(!task.complete_step(0, t0()).unwrap());
        assert!(task.complete_step(1, t0()).unwrap());
        assert!(task.completed);
        assert_eq!(task.completed_at, Some(t0()));
    }

    #[test]
    fn unknown_step_is_out_of_bounds() {
        let mut task = Task::new("Laundry", t0(), t0() + Duration::hours(3));
        assert!(matches!(
            task.complete_step(3, t0()),
            Err(ValidationError::OutOfBounds { index: 3, .. })
        ));
    }

    #[test]
    fn complete_keeps_first_completion_time() {
        let mut task = Task::new("Run", t0(), t0() + Duration::hours(1));
        task.complete(t0());
        task.complete(t0() + Duration::hours(1));
        assert_eq!(task.completed_at, Some(t0()));
    }

    #[test]
    fn reset_for_day_rolls_deadline_forward() {
        let mut task = Task::new("Stretch", t0(), t0() + Duration::hours(12))
            .daily()
            .with_steps(["neck"]);
        task.complete_step(0, t0()).unwrap();
        task.reminder_sent = true;

        // Three days later.
        let start_of_today = Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap();
        task.reset_for_day(start_of_today);

        assert!(!task.completed);
        assert!(task.completed_at.is_none());
        assert!(!task.reminder_sent);
        assert!(!task.steps[0].done);
        assert_eq!(
            task.deadline,
            Utc.with_ymd_and_hms(2026, 3, 4, 21, 0, 0).unwrap()
        );
        assert_eq!(
            task.created_at,
            Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap()
        );
        assert_eq!(
            task.previous_cycle,
            Some(ClosedCycle {
                deadline: t0() + Duration::hours(12),
                completed_at: Some(t0()),
            })
        );
    }

    #[test]
    fn repeated_resets_keep_the_daily_span() {
        let mut task = Task::new("Stretch", t0(), t0() + Duration::hours(12)).daily();
        for day in 2..=5 {
            task.reset_for_day(Utc.with_ymd_and_hms(2026, 3, day, 0, 0, 0).unwrap());
            assert_eq!(task.deadline - task.created_at, Duration::hours(12));
            assert_eq!(
                task.reminder_midpoint(),
                Utc.with_ymd_and_hms(2026, 3, day, 15, 0, 0).unwrap()
            );
        }
        assert_eq!(
            task.previous_cycle.map(|c| c.deadline),
            Some(Utc.with_ymd_and_hms(2026, 3, 4, 21, 0, 0).unwrap())
        );
    }

    #[test]
    fn reset_for_day_keeps_future_deadline() {
        let deadline = Utc.with_ymd_and_hms(2026, 3, 4, 21, 0, 0).unwrap();
        let mut task = Task::new("Stretch", t0(), deadline).daily();
        task.reset_for_day(Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap());
        assert_eq!(task.deadline, deadline);
        assert_eq!(task.created_at, t0());
        assert!(task.previous_cycle.is_none());
    }
}
