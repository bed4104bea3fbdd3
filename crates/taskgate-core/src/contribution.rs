//! Habit contributions: one marker per clean local day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Reason recorded when a day ended without any backlog.
pub const NO_PENDING_TASKS: &str = "no_pending_tasks";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitContribution {
    /// Local calendar day the contribution is for; unique
    pub date: NaiveDate,
    pub value: u32,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A contribution for that date already existed; nothing was written
    AlreadyRecorded,
}

pub trait ContributionStore: Send + Sync {
    fn contribution_for(&self, date: NaiveDate) -> Result<Option<HabitContribution>>;

    /// Insert unless the date is taken. Losing a race on the date is
    /// [`InsertOutcome::AlreadyRecorded`], not an error.
    fn insert_contribution(&self, contribution: &HabitContribution) -> Result<InsertOutcome>;

    /// All contributions, newest first.
    fn list_contributions(&self) -> Result<Vec<HabitContribution>>;
}
