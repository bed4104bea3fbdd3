//! Database schema migrations for taskgate.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = current_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn current_version(conn: &Connection) -> SqliteResult<i32> {
    Ok(conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0))
}

/// Replace the recorded version inside an open transaction.
fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: tasks, penalty anchor, bonus bookkeeping, contributions.
///
/// - `penalty_state` holds exactly one row (id = 1); `revision` is the
///   compare-and-swap key and the anchor uptime is integer milliseconds.
/// - `exemptions.source` is unique so a bonus grants its window once.
/// - `contributions.date` is unique; that constraint is what makes the
///   midnight recorder's check-then-insert race free.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id            TEXT PRIMARY KEY,
            title         TEXT NOT NULL,
            category      TEXT NOT NULL DEFAULT 'general',
            deadline      TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            completed     INTEGER NOT NULL DEFAULT 0,
            completed_at  TEXT,
            is_daily      INTEGER NOT NULL DEFAULT 0,
            is_hard       INTEGER NOT NULL DEFAULT 0,
            reminder_sent INTEGER NOT NULL DEFAULT 0,
            steps_json    TEXT NOT NULL DEFAULT '[]'
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_open_deadline ON tasks(completed, deadline);
        CREATE INDEX IF NOT EXISTS idx_tasks_daily ON tasks(is_daily, deadline);

        CREATE TABLE IF NOT EXISTS penalty_state (
            id                   INTEGER PRIMARY KEY CHECK (id = 1),
            last_system_time     TEXT,
            last_elapsed_ms      INTEGER NOT NULL DEFAULT 0,
            penalty_active_until TEXT,
            revision             INTEGER NOT NULL DEFAULT 0
        );
        INSERT OR IGNORE INTO penalty_state (id) VALUES (1);

        CREATE TABLE IF NOT EXISTS bonus_tasks (
            id           TEXT PRIMARY KEY,
            description  TEXT NOT NULL,
            reward_json  TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS exemptions (
            source     TEXT PRIMARY KEY,
            granted_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            scope_json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_exemptions_expires_at ON exemptions(expires_at);

        CREATE TABLE IF NOT EXISTS bonus_credits (
            id      INTEGER PRIMARY KEY CHECK (id = 1),
            balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0)
        );
        INSERT OR IGNORE INTO bonus_credits (id, balance) VALUES (1, 0);

        CREATE TABLE IF NOT EXISTS contributions (
            date        TEXT PRIMARY KEY,
            value       INTEGER NOT NULL,
            reason      TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        );",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: quest board.
///
/// `(kind, period_key, chain_order)` is unique so regenerating a period's
/// quests after a retry or a missed run inserts nothing twice.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS quests (
            id          TEXT PRIMARY KEY,
            kind        TEXT NOT NULL,
            period_key  TEXT NOT NULL,
            title       TEXT NOT NULL,
            chain_order INTEGER NOT NULL DEFAULT 0,
            expires_at  TEXT NOT NULL,
            completed   INTEGER NOT NULL DEFAULT 0,
            UNIQUE (kind, period_key, chain_order)
        );
        CREATE INDEX IF NOT EXISTS idx_quests_expires_at ON quests(expires_at);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: the cycle a daily reset closed.
///
/// A reset moves the deadline into the new day; `prev_deadline` and
/// `prev_completed_at` keep the old cycle visible to history queries.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE tasks ADD COLUMN prev_deadline TEXT;
        ALTER TABLE tasks ADD COLUMN prev_completed_at TEXT;",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM penalty_state", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn upgrades_from_v1() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 1);

        conn.execute(
            "INSERT INTO tasks (id, title, deadline, created_at)
             VALUES ('t1', 'old', '2026-03-01T12:00:00.000Z', '2026-03-01T09:00:00.000Z')",
            [],
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
        let quests: i64 = conn
            .query_row("SELECT COUNT(*) FROM quests", [], |row| row.get(0))
            .unwrap();
        assert_eq!(quests, 0);
        let prev: Option<String> = conn
            .query_row("SELECT prev_deadline FROM tasks WHERE id = 't1'", [], |row| row.get(0))
            .unwrap();
        assert!(prev.is_none());
    }

    #[test]
    fn contribution_date_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let insert = "INSERT OR IGNORE INTO contributions (date, value, reason, recorded_at)
                      VALUES ('2026-03-01', 1, 'no_pending_tasks', '2026-03-02T00:00:00.000Z')";
        assert_eq!(conn.execute(insert, []).unwrap(), 1);
        assert_eq!(conn.execute(insert, []).unwrap(), 0);
    }
}
