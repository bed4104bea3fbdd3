//! [`BonusStore`] over SQLite.
//!
//! Rewards are applied inside the same transaction that flips
//! `completed_at`, so a crash or a concurrent second completion can never
//! grant twice.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};

use super::database::{parse_opt_ts, parse_ts, ts, Database};
use crate::bonus::{BonusReward, BonusStore, BonusTask, Exemption, ExemptionScope, RewardEffect};
use crate::error::{DatabaseError, Result};

type BonusRow = (String, String, String, Option<String>);

fn read_bonus(row: &Row<'_>) -> rusqlite::Result<BonusRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_bonus((id, description, reward_json, completed_at): BonusRow) -> Result<BonusTask> {
    let reward: BonusReward =
        serde_json::from_str(&reward_json).map_err(|e| DatabaseError::CorruptRow {
            column: "reward_json",
            message: e.to_string(),
        })?;
    Ok(BonusTask {
        id,
        description,
        reward,
        completed_at: parse_opt_ts("completed_at", completed_at)?,
    })
}

fn insert_exemption(tx: &Transaction<'_>, exemption: &Exemption) -> Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO exemptions (source, granted_at, expires_at, scope_json)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            exemption.source,
            ts(exemption.granted_at),
            ts(exemption.expires_at),
            serde_json::to_string(&exemption.scope)?,
        ],
    )?;
    Ok(())
}

impl BonusStore for Database {
    fn insert_bonus_task(&self, task: &BonusTask) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO bonus_tasks (id, description, reward_json, completed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                task.id,
                task.description,
                serde_json::to_string(&task.reward)?,
                task.completed_at.map(ts),
            ],
        )?;
        Ok(())
    }

    fn get_bonus_task(&self, id: &str) -> Result<Option<BonusTask>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, description, reward_json, completed_at FROM bonus_tasks WHERE id = ?1",
            params![id],
            read_bonus,
        )
        .optional()?
        .map(decode_bonus)
        .transpose()
    }

    fn list_bonus_tasks(&self) -> Result<Vec<BonusTask>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, description, reward_json, completed_at FROM bonus_tasks
             ORDER BY completed_at IS NOT NULL, description, id",
        )?;
        let rows = stmt.query_map([], read_bonus)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(decode_bonus(row?)?);
        }
        Ok(tasks)
    }

    fn record_completion(&self, id: &str, at: DateTime<Utc>, effect: &RewardEffect) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let flipped = tx.execute(
            "UPDATE bonus_tasks SET completed_at = ?2 WHERE id = ?1 AND completed_at IS NULL",
            params![id, ts(at)],
        )?;
        if flipped == 0 {
            return Ok(false);
        }
        match effect {
            RewardEffect::Grant(exemption) => insert_exemption(&tx, exemption)?,
            RewardEffect::AddCredits(amount) => {
                tx.execute(
                    "UPDATE bonus_credits SET balance = balance + ?1 WHERE id = 1",
                    params![i64::from(*amount)],
                )?;
            }
        }
        tx.commit()?;
        Ok(true)
    }

    fn active_exemptions(&self, now: DateTime<Utc>) -> Result<Vec<Exemption>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source, granted_at, expires_at, scope_json FROM exemptions
             WHERE granted_at <= ?1 AND expires_at > ?1
             ORDER BY expires_at",
        )?;
        let rows = stmt.query_map(params![ts(now)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut exemptions = Vec::new();
        for row in rows {
            let (source, granted_at, expires_at, scope_json) = row?;
            let scope: ExemptionScope =
                serde_json::from_str(&scope_json).map_err(|e| DatabaseError::CorruptRow {
                    column: "scope_json",
                    message: e.to_string(),
                })?;
            exemptions.push(Exemption {
                source,
                granted_at: parse_ts("granted_at", &granted_at)?,
                expires_at: parse_ts("expires_at", &expires_at)?,
                scope,
            });
        }
        Ok(exemptions)
    }

    fn credits(&self) -> Result<u32> {
        let conn = self.conn()?;
        let balance: i64 =
            conn.query_row("SELECT balance FROM bonus_credits WHERE id = 1", [], |row| row.get(0))?;
        Ok(u32::try_from(balance.max(0)).unwrap_or(u32::MAX))
    }

    fn redeem_credit(&self, exemption: &Exemption) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let spent = tx.execute(
            "UPDATE bonus_credits SET balance = balance - 1 WHERE id = 1 AND balance > 0",
            [],
        )?;
        if spent == 0 {
            return Ok(false);
        }
        insert_exemption(&tx, exemption)?;
        tx.commit()?;
        Ok(true)
    }
}
