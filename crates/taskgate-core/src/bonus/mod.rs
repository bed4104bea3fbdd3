//! Bonus tasks: side-channel obligations that buy temporary relief.
//!
//! Completing a bonus task either grants an exemption window (matching tasks
//! stop counting as overdue until it expires) or adds credits that can later
//! be redeemed for such a window. Completion is recorded once; repeating it
//! grants nothing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Result, ValidationError};
use crate::task::Task;

/// Which tasks an exemption covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ExemptionScope {
    /// Every non-hard task
    AllSoft,
    /// Non-hard tasks in one category
    Category(String),
    /// A single task, hard or not
    Task(String),
}

impl ExemptionScope {
    pub fn covers(&self, task: &Task) -> bool {
        match self {
            ExemptionScope::AllSoft => !task.is_hard,
            ExemptionScope::Category(category) => !task.is_hard && task.category == *category,
            ExemptionScope::Task(id) => task.id == *id,
        }
    }
}

/// What completing a bonus task yields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BonusReward {
    Exemption { minutes: u32, scope: ExemptionScope },
    Credits { amount: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusTask {
    pub id: String,
    pub description: String,
    pub reward: BonusReward,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A time-bounded suspension of blocking for the tasks in `scope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exemption {
    /// Unique origin of the grant (`bonus:<id>` or `credit:<uuid>`)
    pub source: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub scope: ExemptionScope,
}

impl Exemption {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.granted_at <= now && now < self.expires_at
    }
}

/// Side effect applied together with a bonus completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardEffect {
    Grant(Exemption),
    AddCredits(u32),
}

/// Persistence contract for bonus bookkeeping.
pub trait BonusStore: Send + Sync {
    fn insert_bonus_task(&self, task: &BonusTask) -> Result<()>;
    fn get_bonus_task(&self, id: &str) -> Result<Option<BonusTask>>;
    fn list_bonus_tasks(&self) -> Result<Vec<BonusTask>>;

    /// Mark the bonus task completed and apply `effect`, atomically, only if
    /// it was not completed before. Returns whether this call completed it.
    fn record_completion(&self, id: &str, at: DateTime<Utc>, effect: &RewardEffect) -> Result<bool>;

    /// Exemptions whose window contains `now`.
    fn active_exemptions(&self, now: DateTime<Utc>) -> Result<Vec<Exemption>>;

    fn credits(&self) -> Result<u32>;

    /// Spend one credit and store `exemption`, atomically. Returns false when
    /// no credit is left.
    fn redeem_credit(&self, exemption: &Exemption) -> Result<bool>;
}

/// Result of completing a bonus task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusCompletion {
    pub newly_completed: bool,
    pub granted: Option<Exemption>,
    pub credits_added: u32,
}

pub struct BonusManager {
    store: Arc<dyn BonusStore>,
    clock: Arc<dyn Clock>,
}

impl BonusManager {
    pub fn new(store: Arc<dyn BonusStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn add_bonus_task(&self, description: impl Into<String>, reward: BonusReward) -> Result<BonusTask> {
        let task = BonusTask {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            reward,
            completed_at: None,
        };
        self.store.insert_bonus_task(&task)?;
        Ok(task)
    }

    pub fn list_bonus_tasks(&self) -> Result<Vec<BonusTask>> {
        self.store.list_bonus_tasks()
    }

    /// Complete a bonus task and apply its reward once.
    ///
    /// # Errors
    /// `NotFound` for an unknown id; store failures propagate.
    pub fn complete_bonus_task(&self, id: &str) -> Result<BonusCompletion> {
        let task = self
            .store
            .get_bonus_task(id)?
            .ok_or_else(|| ValidationError::NotFound {
                entity: "bonus task",
                id: id.to_string(),
            })?;
        let now = self.clock.now();

        let effect = match &task.reward {
            BonusReward::Exemption { minutes, scope } => RewardEffect::Grant(Exemption {
                source: format!("bonus:{}", task.id),
                granted_at: now,
                expires_at: now + chrono::Duration::minutes(i64::from(*minutes)),
                scope: scope.clone(),
            }),
            BonusReward::Credits { amount } => RewardEffect::AddCredits(*amount),
        };

        if !self.store.record_completion(&task.id, now, &effect)? {
            return Ok(BonusCompletion {
                newly_completed: false,
                granted: None,
                credits_added: 0,
            });
        }

        info!(bonus_id = %task.id, "bonus task completed");
        Ok(match effect {
            RewardEffect::Grant(exemption) => BonusCompletion {
                newly_completed: true,
                granted: Some(exemption),
                credits_added: 0,
            },
            RewardEffect::AddCredits(amount) => BonusCompletion {
                newly_completed: true,
                granted: None,
                credits_added: amount,
            },
        })
    }

    pub fn active_exemptions(&self) -> Result<Vec<Exemption>> {
        self.active_exemptions_at(self.clock.now())
    }

    pub fn active_exemptions_at(&self, now: DateTime<Utc>) -> Result<Vec<Exemption>> {
        self.store.active_exemptions(now)
    }

    pub fn credits(&self) -> Result<u32> {
        self.store.credits()
    }

    /// Turn one credit into an exemption window starting now.
    ///
    /// # Errors
    /// `InvalidValue` when no credit is available.
    pub fn redeem_credit(&self, scope: ExemptionScope, duration: Duration) -> Result<Exemption> {
        let now = self.clock.now();
        let exemption = Exemption {
            source: format!("credit:{}", Uuid::new_v4()),
            granted_at: now,
            expires_at: now + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero()),
            scope,
        };
        if !self.store.redeem_credit(&exemption)? {
            return Err(ValidationError::InvalidValue {
                field: "credits".to_string(),
                message: "no bonus credit left to redeem".to_string(),
            }
            .into());
        }
        info!(source = %exemption.source, "credit redeemed");
        Ok(exemption)
    }
}

/// Whether any of `exemptions` covers `task`.
pub fn is_exempt(task: &Task, exemptions: &[Exemption]) -> bool {
    exemptions.iter().any(|e| e.scope.covers(task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        tasks: Mutex<HashMap<String, BonusTask>>,
        exemptions: Mutex<Vec<Exemption>>,
        credits: Mutex<u32>,
    }

    impl BonusStore for MemoryStore {
        fn insert_bonus_task(&self, task: &BonusTask) -> Result<()> {
            self.tasks.lock().unwrap().insert(task.id.clone(), task.clone());
            Ok(())
        }

        fn get_bonus_task(&self, id: &str) -> Result<Option<BonusTask>> {
            Ok(self.tasks.lock().unwrap().get(id).cloned())
        }

        fn list_bonus_tasks(&self) -> Result<Vec<BonusTask>> {
            Ok(self.tasks.lock().unwrap().values().cloned().collect())
        }

        fn record_completion(&self, id: &str, at: DateTime<Utc>, effect: &RewardEffect) -> Result<bool> {
            let mut tasks = self.tasks.lock().unwrap();
            let Some(task) = tasks.get_mut(id) else {
                return Ok(false);
            };
            if task.completed_at.is_some() {
                return Ok(false);
            }
            task.completed_at = Some(at);
            match effect {
                RewardEffect::Grant(e) => self.exemptions.lock().unwrap().push(e.clone()),
                RewardEffect::AddCredits(n) => *self.credits.lock().unwrap() += n,
            }
            Ok(true)
        }

        fn active_exemptions(&self, now: DateTime<Utc>) -> Result<Vec<Exemption>> {
            Ok(self
                .exemptions
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.is_active(now))
                .cloned()
                .collect())
        }

        fn credits(&self) -> Result<u32> {
            Ok(*self.credits.lock().unwrap())
        }

        fn redeem_credit(&self, exemption: &Exemption) -> Result<bool> {
            let mut credits = self.credits.lock().unwrap();
            if *credits == 0 {
                return Ok(false);
            }
            *credits -= 1;
            self.exemptions.lock().unwrap().push(exemption.clone());
            Ok(true)
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (Arc<ManualClock>, BonusManager) {
        let clock = Arc::new(ManualClock::new(t0(), Duration::from_secs(1)));
        let manager = BonusManager::new(Arc::new(MemoryStore::default()), clock.clone());
        (clock, manager)
    }

    #[test]
    fn completing_twice_grants_one_window() {
        let (_clock, manager) = setup();
        let bonus = manager
            .add_bonus_task(
                "Walk 5k",
                BonusReward::Exemption {
                    minutes: 30,
                    scope: ExemptionScope::AllSoft,
                },
            )
            .unwrap();

        let first = manager.complete_bonus_task(&bonus.id).unwrap();
        assert!(first.newly_completed);
        assert_eq!(
            first.granted.unwrap().expires_at,
            t0() + chrono::Duration::minutes(30)
        );

        let second = manager.complete_bonus_task(&bonus.id).unwrap();
        assert!(!second.newly_completed);
        assert_eq!(manager.active_exemptions().unwrap().len(), 1);
    }

    #[test]
    fn exemption_expires() {
        let (clock, manager) = setup();
        let bonus = manager
            .add_bonus_task(
                "Meditate",
                BonusReward::Exemption {
                    minutes: 10,
                    scope: ExemptionScope::AllSoft,
                },
            )
            .unwrap();
        manager.complete_bonus_task(&bonus.id).unwrap();
        clock.advance(Duration::from_secs(601));
        assert!(manager.active_exemptions().unwrap().is_empty());
    }

    #[test]
    fn credits_accumulate_once_and_redeem() {
        let (_clock, manager) = setup();
        let bonus = manager
            .add_bonus_task("Clean desk", BonusReward::Credits { amount: 2 })
            .unwrap();
        manager.complete_bonus_task(&bonus.id).unwrap();
        manager.complete_bonus_task(&bonus.id).unwrap();
        assert_eq!(manager.credits().unwrap(), 2);

        manager
            .redeem_credit(ExemptionScope::AllSoft, Duration::from_secs(900))
            .unwrap();
        manager
            .redeem_credit(ExemptionScope::AllSoft, Duration::from_secs(900))
            .unwrap();
        assert_eq!(manager.credits().unwrap(), 0);
        assert!(manager
            .redeem_credit(ExemptionScope::AllSoft, Duration::from_secs(900))
            .is_err());
    }

    #[test]
    fn unknown_bonus_task_is_not_found() {
        let (_clock, manager) = setup();
        assert!(manager.complete_bonus_task("missing").is_err());
    }

    #[test]
    fn scopes_never_cover_hard_tasks_implicitly() {
        let soft = Task::new("soft", t0(), t0()).with_category("chores");
        let hard = Task::new("hard", t0(), t0()).with_category("chores").hard();

        assert!(ExemptionScope::AllSoft.covers(&soft));
        assert!(!ExemptionScope::AllSoft.covers(&hard));
        assert!(ExemptionScope::Category("chores".into()).covers(&soft));
        assert!(!ExemptionScope::Category("chores".into()).covers(&hard));
        assert!(!ExemptionScope::Category("study".into()).covers(&soft));
        assert!(ExemptionScope::Task(hard.id.clone()).covers(&hard));
    }
}
