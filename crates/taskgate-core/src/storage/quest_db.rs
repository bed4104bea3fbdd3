//! [`QuestBoard`] over SQLite.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use super::database::{parse_ts, ts, Database};
use crate::error::{DatabaseError, Result};
use crate::quest::{Quest, QuestBoard, QuestKind};

impl Database {
    fn insert_quests(
        &self,
        kind: QuestKind,
        period_key: &str,
        titles: &[String],
        expires_at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0u64;
        for (order, title) in titles.iter().enumerate() {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO quests (id, kind, period_key, title, chain_order, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    kind.as_str(),
                    period_key,
                    title,
                    order as i64,
                    ts(expires_at),
                ],
            )? as u64;
        }
        tx.commit()?;
        Ok(inserted)
    }
}

impl QuestBoard for Database {
    fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM quests WHERE expires_at <= ?1", params![ts(now)])? as u64)
    }

    fn generate_daily(&self, day_key: &str, titles: &[String], expires_at: DateTime<Utc>) -> Result<u64> {
        self.insert_quests(QuestKind::Daily, day_key, titles, expires_at)
    }

    fn generate_weekly_chain(
        &self,
        week_key: &str,
        titles: &[String],
        expires_at: DateTime<Utc>,
    ) -> Result<u64> {
        self.insert_quests(QuestKind::WeeklyChain, week_key, titles, expires_at)
    }

    fn list_quests(&self) -> Result<Vec<Quest>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, period_key, title, chain_order, expires_at, completed FROM quests
             ORDER BY kind, period_key, chain_order",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, bool>(6)?,
            ))
        })?;
        let mut quests = Vec::new();
        for row in rows {
            let (id, kind, period_key, title, chain_order, expires_at, completed) = row?;
            let kind = QuestKind::parse(&kind).ok_or_else(|| DatabaseError::CorruptRow {
                column: "kind",
                message: kind.clone(),
            })?;
            quests.push(Quest {
                id,
                kind,
                period_key,
                title,
                chain_order: u32::try_from(chain_order.max(0)).unwrap_or(u32::MAX),
                expires_at: parse_ts("expires_at", &expires_at)?,
                completed,
            });
        }
        Ok(quests)
    }
}
