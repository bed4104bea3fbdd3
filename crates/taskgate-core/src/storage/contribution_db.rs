//! [`ContributionStore`] over SQLite.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::database::{parse_ts, ts, Database};
use crate::contribution::{ContributionStore, HabitContribution, InsertOutcome};
use crate::day::date_key;
use crate::error::{DatabaseError, Result};

type ContributionRow = (String, i64, String, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<ContributionRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode((date, value, reason, recorded_at): ContributionRow) -> Result<HabitContribution> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| DatabaseError::CorruptRow {
        column: "date",
        message: format!("{date}: {e}"),
    })?;
    Ok(HabitContribution {
        date,
        value: u32::try_from(value.max(0)).unwrap_or(u32::MAX),
        reason,
        recorded_at: parse_ts("recorded_at", &recorded_at)?,
    })
}

impl ContributionStore for Database {
    fn contribution_for(&self, date: NaiveDate) -> Result<Option<HabitContribution>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT date, value, reason, recorded_at FROM contributions WHERE date = ?1",
            params![date_key(date)],
            read_row,
        )
        .optional()?
        .map(decode)
        .transpose()
    }

    fn insert_contribution(&self, contribution: &HabitContribution) -> Result<InsertOutcome> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO contributions (date, value, reason, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                date_key(contribution.date),
                i64::from(contribution.value),
                contribution.reason,
                ts(contribution.recorded_at),
            ],
        )?;
        Ok(if inserted == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyRecorded
        })
    }

    fn list_contributions(&self) -> Result<Vec<HabitContribution>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT date, value, reason, recorded_at FROM contributions ORDER BY date DESC")?;
        let rows = stmt.query_map([], read_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(decode(row?)?);
        }
        Ok(out)
    }
}
