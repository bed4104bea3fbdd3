//! Reminder delivery boundary.
//!
//! How a reminder reaches the user is not the core's concern. Workers hand a
//! [`Reminder`] to a [`Notifier`]; failures are the caller's to log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub task_id: String,
    pub title: String,
    pub deadline: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

pub trait Notifier: Send + Sync {
    fn notify(&self, reminder: &Reminder) -> Result<(), NotifyError>;
}

/// Delivers reminders as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, reminder: &Reminder) -> Result<(), NotifyError> {
        info!(
            task_id = %reminder.task_id,
            deadline = %reminder.deadline,
            "reminder: {} is halfway to its deadline",
            reminder.title
        );
        Ok(())
    }
}
