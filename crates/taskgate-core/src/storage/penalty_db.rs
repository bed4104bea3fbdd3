//! [`PenaltyStore`] over the single-row `penalty_state` table.

use std::time::Duration;

use rusqlite::params;

use super::database::{parse_opt_ts, ts, Database};
use crate::error::Result;
use crate::penalty::{PenaltyState, PenaltyStore};

impl PenaltyStore for Database {
    fn load(&self) -> Result<PenaltyState> {
        let conn = self.conn()?;
        let (last_system_time, last_elapsed_ms, until, revision) = conn.query_row(
            "SELECT last_system_time, last_elapsed_ms, penalty_active_until, revision
             FROM penalty_state WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )?;
        Ok(PenaltyState {
            last_system_time: parse_opt_ts("last_system_time", last_system_time)?,
            last_elapsed_realtime: Duration::from_millis(last_elapsed_ms.max(0) as u64),
            penalty_active_until: parse_opt_ts("penalty_active_until", until)?,
            revision: revision.max(0) as u64,
        })
    }

    fn compare_and_swap(&self, expected: u64, next: &PenaltyState) -> Result<bool> {
        let conn = self.conn()?;
        let elapsed_ms = i64::try_from(next.last_elapsed_realtime.as_millis()).unwrap_or(i64::MAX);
        let changed = conn.execute(
            "UPDATE penalty_state
             SET last_system_time = ?1, last_elapsed_ms = ?2, penalty_active_until = ?3,
                 revision = revision + 1
             WHERE id = 1 AND revision = ?4",
            params![
                next.last_system_time.map(ts),
                elapsed_ms,
                next.penalty_active_until.map(ts),
                expected as i64,
            ],
        )?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn fresh_state_is_idle() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.load().unwrap(), PenaltyState::default());
    }

    #[test]
    fn stale_revision_loses() {
        let db = Database::open_memory().unwrap();
        let wall = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let next = PenaltyState {
            last_system_time: Some(wall),
            last_elapsed_realtime: Duration::from_millis(12_345),
            penalty_active_until: Some(wall + chrono::Duration::hours(1)),
            revision: 0,
        };

        assert!(db.compare_and_swap(0, &next).unwrap());
        assert!(!db.compare_and_swap(0, &next).unwrap());

        let stored = db.load().unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(stored.last_elapsed_realtime, Duration::from_millis(12_345));
        assert_eq!(stored.penalty_active_until, next.penalty_active_until);
    }
}
