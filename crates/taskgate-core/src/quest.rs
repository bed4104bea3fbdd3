//! Quest board contract.
//!
//! Only the refresh side is modeled: expired quests are cleaned up and each
//! period's quests are generated from configured titles. Every generation
//! step is keyed on `(kind, period_key, chain_order)`, so running it again for
//! the same period inserts nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestKind {
    Daily,
    WeeklyChain,
}

impl QuestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestKind::Daily => "daily",
            QuestKind::WeeklyChain => "weekly_chain",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(QuestKind::Daily),
            "weekly_chain" => Some(QuestKind::WeeklyChain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub kind: QuestKind,
    /// Day key (`2026-03-01`) or ISO week key (`2026-W09`)
    pub period_key: String,
    pub title: String,
    /// Position within the period; for chains, the unlock order
    pub chain_order: u32,
    pub expires_at: DateTime<Utc>,
    pub completed: bool,
}

pub trait QuestBoard: Send + Sync {
    /// Delete quests whose `expires_at` is not after `now`. Returns how many.
    fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Ensure one daily quest per title exists for `day_key`. Returns how
    /// many were newly inserted.
    fn generate_daily(&self, day_key: &str, titles: &[String], expires_at: DateTime<Utc>) -> Result<u64>;

    /// Ensure the chain for `week_key` exists, in title order.
    fn generate_weekly_chain(
        &self,
        week_key: &str,
        titles: &[String],
        expires_at: DateTime<Utc>,
    ) -> Result<u64>;

    fn list_quests(&self) -> Result<Vec<Quest>>;
}
