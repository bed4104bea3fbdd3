//! [`TaskStore`] over SQLite.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};

use super::database::{parse_opt_ts, parse_ts, ts, Database};
use crate::error::{DatabaseError, Result, ValidationError};
use crate::task::{ClosedCycle, SubStep, Task, TaskStore};

const TASK_COLUMNS: &str = "id, title, category, deadline, created_at, completed, completed_at, \
                            is_daily, is_hard, reminder_sent, steps_json, prev_deadline, \
                            prev_completed_at";

/// Raw column values; converted to [`Task`] outside the rusqlite callback so
/// decode failures keep their own error type.
struct TaskRow {
    id: String,
    title: String,
    category: String,
    deadline: String,
    created_at: String,
    completed: bool,
    completed_at: Option<String>,
    is_daily: bool,
    is_hard: bool,
    reminder_sent: bool,
    steps_json: String,
    prev_deadline: Option<String>,
    prev_completed_at: Option<String>,
}

impl TaskRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            category: row.get(2)?,
            deadline: row.get(3)?,
            created_at: row.get(4)?,
            completed: row.get(5)?,
            completed_at: row.get(6)?,
            is_daily: row.get(7)?,
            is_hard: row.get(8)?,
            reminder_sent: row.get(9)?,
            steps_json: row.get(10)?,
            prev_deadline: row.get(11)?,
            prev_completed_at: row.get(12)?,
        })
    }

    fn into_task(self) -> Result<Task, DatabaseError> {
        let steps: Vec<SubStep> =
            serde_json::from_str(&self.steps_json).map_err(|e| DatabaseError::CorruptRow {
                column: "steps_json",
                message: e.to_string(),
            })?;
        let previous_cycle = match parse_opt_ts("prev_deadline", self.prev_deadline)? {
            Some(deadline) => Some(ClosedCycle {
                deadline,
                completed_at: parse_opt_ts("prev_completed_at", self.prev_completed_at)?,
            }),
            None => None,
        };
        Ok(Task {
            id: self.id,
            title: self.title,
            category: self.category,
            deadline: parse_ts("deadline", &self.deadline)?,
            created_at: parse_ts("created_at", &self.created_at)?,
            completed: self.completed,
            completed_at: parse_opt_ts("completed_at", self.completed_at)?,
            is_daily: self.is_daily,
            is_hard: self.is_hard,
            reminder_sent: self.reminder_sent,
            steps,
            previous_cycle,
        })
    }
}

fn steps_json(task: &Task) -> Result<String> {
    Ok(serde_json::to_string(&task.steps)?)
}

fn select_tasks<P: Params>(conn: &Connection, filter: &str, params: P) -> Result<Vec<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE {filter} ORDER BY deadline, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, TaskRow::read)?;
    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?.into_task()?);
    }
    Ok(tasks)
}

fn count<P: Params>(conn: &Connection, filter: &str, params: P) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM tasks WHERE {filter}");
    let n: i64 = conn.query_row(&sql, params, |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

impl TaskStore for Database {
    fn create(&self, task: &Task) -> Result<()> {
        task.validate()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tasks (id, title, category, deadline, created_at, completed, completed_at,
                                is_daily, is_hard, reminder_sent, steps_json, prev_deadline,
                                prev_completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                task.id,
                task.title,
                task.category,
                ts(task.deadline),
                ts(task.created_at),
                task.completed,
                task.completed_at.map(ts),
                task.is_daily,
                task.is_hard,
                task.reminder_sent,
                steps_json(task)?,
                task.previous_cycle.map(|c| ts(c.deadline)),
                task.previous_cycle.and_then(|c| c.completed_at).map(ts),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        let row = conn.query_row(&sql, params![id], TaskRow::read).optional()?;
        Ok(row.map(TaskRow::into_task).transpose()?)
    }

    fn list(&self) -> Result<Vec<Task>> {
        select_tasks(&*self.conn()?, "1 = 1", [])
    }

    fn update(&self, task: &Task) -> Result<()> {
        task.validate()?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE tasks SET title = ?2, category = ?3, deadline = ?4, created_at = ?5,
                              completed = ?6, completed_at = ?7, is_daily = ?8, is_hard = ?9,
                              reminder_sent = ?10, steps_json = ?11, prev_deadline = ?12,
                              prev_completed_at = ?13
             WHERE id = ?1",
            params![
                task.id,
                task.title,
                task.category,
                ts(task.deadline),
                ts(task.created_at),
                task.completed,
                task.completed_at.map(ts),
                task.is_daily,
                task.is_hard,
                task.reminder_sent,
                steps_json(task)?,
                task.previous_cycle.map(|c| ts(c.deadline)),
                task.previous_cycle.and_then(|c| c.completed_at).map(ts),
            ],
        )?;
        if changed == 0 {
            return Err(ValidationError::NotFound {
                entity: "task",
                id: task.id.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])? > 0)
    }

    fn count_all_incomplete_non_daily_tasks(&self) -> Result<u64> {
        count(&*self.conn()?, "completed = 0 AND is_daily = 0", [])
    }

    fn tasks_violating_hardness(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        select_tasks(
            &*self.conn()?,
            "completed = 0 AND is_hard = 1 AND deadline < ?1",
            params![ts(now)],
        )
    }

    fn overdue_incomplete(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        select_tasks(&*self.conn()?, "completed = 0 AND deadline < ?1", params![ts(now)])
    }

    fn daily_tasks_needing_reset(&self, start_of_today: DateTime<Utc>) -> Result<Vec<Task>> {
        select_tasks(
            &*self.conn()?,
            "is_daily = 1 AND deadline < ?1",
            params![ts(start_of_today)],
        )
    }

    fn all_incomplete_tasks(&self) -> Result<Vec<Task>> {
        select_tasks(&*self.conn()?, "completed = 0", [])
    }

    fn count_pending_non_daily_at(&self, instant: DateTime<Utc>) -> Result<u64> {
        count(
            &*self.conn()?,
            "is_daily = 0 AND created_at < ?1
             AND (completed = 0 OR completed_at IS NULL OR completed_at >= ?1)",
            params![ts(instant)],
        )
    }

    fn count_overdue_incomplete_at(&self, instant: DateTime<Utc>) -> Result<u64> {
        count(
            &*self.conn()?,
            "(deadline < ?1 AND (completed = 0 OR completed_at IS NULL OR completed_at > ?1))
             OR (prev_deadline < ?1 AND (prev_completed_at IS NULL OR prev_completed_at > ?1))",
            params![ts(instant)],
        )
    }
}
