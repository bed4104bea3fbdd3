use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{WorkContext, WorkOutcome, Worker};
use crate::clock::Clock;
use crate::day::DayBoundary;
use crate::error::Result;
use crate::notify::{Notifier, Reminder};
use crate::task::TaskStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderSummary {
    pub sent: usize,
    /// Same-day tasks past their midpoint that get no reminder
    pub suppressed: usize,
    /// Marked as sent but delivery failed
    pub failed: usize,
}

/// Sends one halfway reminder per task.
///
/// The `reminder_sent` flag is persisted before delivery, so a crash or a
/// rerun can lose a reminder but never repeat one.
pub struct ReminderWorker {
    tasks: Arc<dyn TaskStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    day: DayBoundary,
    enabled: bool,
}

impl ReminderWorker {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        day: DayBoundary,
    ) -> Self {
        Self {
            tasks,
            notifier,
            clock,
            day,
            enabled: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn send_due(&self) -> Result<ReminderSummary> {
        let mut summary = ReminderSummary::default();
        if !self.enabled {
            debug!("reminders disabled");
            return Ok(summary);
        }

        let now = self.clock.now();
        for mut task in self.tasks.all_incomplete_tasks()? {
            if task.reminder_sent || now < task.reminder_midpoint() {
                continue;
            }
            if self.day.same_day(task.created_at, task.deadline) {
                summary.suppressed += 1;
                continue;
            }

            task.reminder_sent = true;
            self.tasks.update(&task)?;

            let reminder = Reminder {
                task_id: task.id.clone(),
                title: task.title.clone(),
                deadline: task.deadline,
            };
            match self.notifier.notify(&reminder) {
                Ok(()) => summary.sent += 1,
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "reminder delivery failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}

impl Worker for ReminderWorker {
    fn name(&self) -> &'static str {
        "reminder"
    }

    fn run(&self, ctx: &WorkContext) -> WorkOutcome {
        match self.send_due() {
            Ok(summary) => {
                info!(
                    sent = summary.sent,
                    suppressed = summary.suppressed,
                    failed = summary.failed,
                    "reminders processed"
                );
                WorkOutcome::Success
            }
            Err(e) => {
                warn!(attempt = ctx.attempt, error = %e, "reminder run failed");
                WorkOutcome::Retry
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::NotifyError;
    use crate::storage::Database;
    use crate::task::Task;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        delivered: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Notifier for Recording {
        fn notify(&self, reminder: &Reminder) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Rejected("permission denied".into()));
            }
            self.delivered.lock().unwrap().push(reminder.task_id.clone());
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn setup(notifier: Arc<Recording>) -> (Arc<Database>, Arc<ManualClock>, ReminderWorker) {
        let db = Arc::new(Database::open_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0(), std::time::Duration::from_secs(1)));
        let worker = ReminderWorker::new(db.clone(), notifier, clock.clone(), DayBoundary::utc());
        (db, clock, worker)
    }

    #[test]
    fn same_day_task_is_suppressed() {
        let notifier = Arc::new(Recording::default());
        let (db, clock, worker) = setup(notifier.clone());
        let task = Task::new("Short", t0(), t0() + Duration::hours(2));
        db.create(&task).unwrap();

        clock.advance(std::time::Duration::from_secs(3600));
        let summary = worker.send_due().unwrap();
        assert_eq!(summary.suppressed, 1);
        assert_eq!(summary.sent, 0);
        assert!(notifier.delivered.lock().unwrap().is_empty());
        assert!(!db.get(&task.id).unwrap().unwrap().reminder_sent);
    }

    #[test]
    fn multi_day_task_is_reminded_once() {
        let notifier = Arc::new(Recording::default());
        let (db, clock, worker) = setup(notifier.clone());
        let task = Task::new("Long", t0(), t0() + Duration::hours(50));
        db.create(&task).unwrap();

        clock.advance(std::time::Duration::from_secs(24 * 3600));
        assert_eq!(worker.send_due().unwrap().sent, 0);

        clock.advance(std::time::Duration::from_secs(3600));
        assert_eq!(worker.run(&WorkContext::first()), WorkOutcome::Success);
        assert_eq!(worker.run(&WorkContext::first()), WorkOutcome::Success);

        assert_eq!(*notifier.delivered.lock().unwrap(), vec![task.id.clone()]);
        assert!(db.get(&task.id).unwrap().unwrap().reminder_sent);
    }

    #[test]
    fn delivery_failure_is_swallowed_and_not_retried() {
        let notifier = Arc::new(Recording {
            fail: true,
            ..Recording::default()
        });
        let (db, clock, worker) = setup(notifier);
        let task = Task::new("Long", t0(), t0() + Duration::hours(50));
        db.create(&task).unwrap();

        clock.advance(std::time::Duration::from_secs(30 * 3600));
        assert_eq!(worker.run(&WorkContext::first()), WorkOutcome::Success);
        assert!(db.get(&task.id).unwrap().unwrap().reminder_sent);
        assert_eq!(worker.send_due().unwrap(), ReminderSummary::default());
    }

    #[test]
    fn disabled_worker_sends_nothing() {
        let notifier = Arc::new(Recording::default());
        let (db, clock, worker) = setup(notifier.clone());
        let worker = worker.enabled(false);
        db.create(&Task::new("Long", t0(), t0() + Duration::hours(50)))
            .unwrap();

        clock.advance(std::time::Duration::from_secs(30 * 3600));
        assert_eq!(worker.send_due().unwrap(), ReminderSummary::default());
        assert!(notifier.delivered.lock().unwrap().is_empty());
    }
}
