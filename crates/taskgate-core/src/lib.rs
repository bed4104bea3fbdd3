//! # taskgate core library
//!
//! The blocking-decision core of a personal commitment device: distracting
//! apps and sites stay blocked until self-imposed task obligations are met.
//! Every enforcement path (UI, network filter, app blocker) asks the same
//! [`DecisionEngine`] and gets the same answer.
//!
//! ## Architecture
//!
//! - **Decision engine**: stateless evaluator over tasks, penalty and bonus
//!   state, with a fixed precedence of blocking reasons
//! - **Penalty manager**: penalty windows measured on device uptime so that
//!   changing the wall clock cannot end them early
//! - **Bonus manager**: bonus tasks that grant exemption windows or credits
//! - **Workers**: idempotent daily reset, clean-day contribution, halfway
//!   reminders and quest refresh, run by a retrying scheduler
//! - **Storage**: SQLite implementation of every store contract and TOML
//!   configuration
//!
//! ## Key Components
//!
//! - [`App`]: composition root
//! - [`DecisionEngine`]: the blocking verdict
//! - [`PenaltyManager`]: tamper-resistant penalty state machine
//! - [`Database`]: persistence
//! - [`Config`]: configuration

pub mod app;
pub mod blocking;
pub mod bonus;
pub mod clock;
pub mod contribution;
pub mod day;
pub mod error;
pub mod logging;
pub mod notify;
pub mod penalty;
pub mod quest;
pub mod storage;
pub mod task;
pub mod workers;

pub use app::{App, WorkerKind};
pub use blocking::{BlockReason, DecisionEngine, EngineConfig, Verdict, VerdictFeed};
pub use bonus::{BonusManager, BonusReward, BonusTask, Exemption, ExemptionScope};
pub use clock::{Clock, ManualClock, SystemClock};
pub use contribution::{ContributionStore, HabitContribution, InsertOutcome};
pub use day::DayBoundary;
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use notify::{LogNotifier, Notifier, NotifyError, Reminder};
pub use penalty::{PenaltyManager, PenaltyPolicy, PenaltyState, PenaltyStatus};
pub use quest::{Quest, QuestBoard, QuestKind};
pub use storage::{Config, Database};
pub use task::{ClosedCycle, SubStep, Task, TaskStore};
pub use workers::{RetryPolicy, WorkContext, WorkOutcome, WorkReport, WorkScheduler, Worker};
