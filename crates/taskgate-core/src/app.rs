//! Composition root.
//!
//! [`App`] wires one database, one clock and the configuration into the
//! managers, the decision engine and the workers. Nothing in the library is
//! global; binaries build one `App` and pass it around.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::blocking::DecisionEngine;
use crate::bonus::BonusManager;
use crate::clock::{Clock, SystemClock};
use crate::contribution::ContributionStore;
use crate::day::DayBoundary;
use crate::error::Result;
use crate::notify::{LogNotifier, Notifier};
use crate::penalty::PenaltyManager;
use crate::quest::QuestBoard;
use crate::storage::{Config, Database};
use crate::task::TaskStore;
use crate::workers::{
    DailyTaskResetWorker, MidnightContributionWorker, QuestRefreshWorker, ReminderWorker,
    WorkScheduler, Worker,
};

/// The scheduled workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Reset,
    Contribution,
    Reminder,
    Quests,
}

impl WorkerKind {
    /// Full-run order. Yesterday is judged before daily tasks roll over.
    pub const ALL: [WorkerKind; 4] = [
        WorkerKind::Contribution,
        WorkerKind::Reset,
        WorkerKind::Reminder,
        WorkerKind::Quests,
    ];
}

pub struct App {
    pub config: Config,
    pub db: Arc<Database>,
    pub clock: Arc<dyn Clock>,
    pub day: DayBoundary,
    pub penalty: Arc<PenaltyManager>,
    pub bonus: Arc<BonusManager>,
    pub engine: Arc<DecisionEngine>,
    notifier: Arc<dyn Notifier>,
}

impl App {
    /// Load configuration and open the database from the data directory.
    pub fn open() -> Result<Self> {
        let config = Config::load()?;
        let db = Arc::new(Database::open()?);
        Self::with_parts(config, db, Arc::new(SystemClock::new()))
    }

    pub fn with_parts(config: Config, db: Arc<Database>, clock: Arc<dyn Clock>) -> Result<Self> {
        let day = config.day_boundary()?;
        let penalty = Arc::new(PenaltyManager::new(
            db.clone(),
            clock.clone(),
            config.penalty_policy(),
        ));
        let bonus = Arc::new(BonusManager::new(db.clone(), clock.clone()));
        let engine = Arc::new(DecisionEngine::new(
            db.clone(),
            penalty.clone(),
            bonus.clone(),
            clock.clone(),
            config.engine_config(),
        ));
        Ok(Self {
            config,
            db,
            clock,
            day,
            penalty,
            bonus,
            engine,
            notifier: Arc::new(LogNotifier),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn tasks(&self) -> Arc<dyn TaskStore> {
        self.db.clone()
    }

    pub fn contributions(&self) -> Arc<dyn ContributionStore> {
        self.db.clone()
    }

    pub fn quests(&self) -> Arc<dyn QuestBoard> {
        self.db.clone()
    }

    pub fn worker(&self, kind: WorkerKind) -> Arc<dyn Worker> {
        match kind {
            WorkerKind::Reset => Arc::new(DailyTaskResetWorker::new(
                self.tasks(),
                self.clock.clone(),
                self.day,
            )),
            WorkerKind::Contribution => Arc::new(MidnightContributionWorker::new(
                self.tasks(),
                self.contributions(),
                self.clock.clone(),
                self.day,
            )),
            WorkerKind::Reminder => Arc::new(
                ReminderWorker::new(
                    self.tasks(),
                    self.notifier.clone(),
                    self.clock.clone(),
                    self.day,
                )
                .enabled(self.config.reminders.enabled),
            ),
            WorkerKind::Quests => Arc::new(
                QuestRefreshWorker::new(
                    self.quests(),
                    self.clock.clone(),
                    self.day,
                    self.config.quests.daily.clone(),
                    self.config.quests.weekly_chain.clone(),
                )
                .with_max_attempts(self.config.workers.quest_max_attempts),
            ),
        }
    }

    pub fn workers(&self) -> Vec<Arc<dyn Worker>> {
        WorkerKind::ALL.iter().map(|kind| self.worker(*kind)).collect()
    }

    pub fn scheduler(&self) -> WorkScheduler {
        WorkScheduler::new(self.config.retry_policy())
    }
}
