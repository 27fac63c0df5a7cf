//! Durable task queue backing the scheduler.
//!
//! Delivery is at-least-once: a task is acknowledged (deleted) only after
//! its handler committed, and a claim lease that expires makes the task
//! visible again.

use anyhow::Result;
use rusqlite::{Connection, Row, params};

use crate::models::ScheduledTaskRow;
use crate::{Database, new_id};

pub const STATE_PENDING: &str = "pending";
pub const STATE_FAILED: &str = "failed";

const TASK_COLUMNS: &str =
    "id, kind, payload, run_at, attempts, locked_until, state, last_error, created_at";

impl Database {
    pub fn pending_task_count(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM scheduled_tasks WHERE state = ?1",
                [STATE_PENDING],
                |r| r.get(0),
            )?)
        })
    }

    pub fn failed_tasks(&self) -> Result<Vec<ScheduledTaskRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM scheduled_tasks WHERE state = ?1 ORDER BY created_at",
                TASK_COLUMNS
            ))?;
            let rows = stmt
                .query_map([STATE_FAILED], task_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Enqueue a task on the caller's connection so it commits with the
/// caller's transaction.
pub fn enqueue_task(conn: &Connection, kind: &str, payload: &str, run_at: i64, now: i64) -> Result<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO scheduled_tasks (id, kind, payload, run_at, created_at, state)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, kind, payload, run_at, now, STATE_PENDING],
    )?;
    Ok(id)
}

/// Claim up to `limit` due tasks, oldest `run_at` first, leasing each until
/// `now + lease_ms` and bumping its attempt counter.
pub fn claim_due_tasks(conn: &Connection, now: i64, lease_ms: i64, limit: usize) -> Result<Vec<ScheduledTaskRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM scheduled_tasks
         WHERE state = ?1 AND run_at <= ?2 AND (locked_until IS NULL OR locked_until <= ?2)
         ORDER BY run_at, rowid
         LIMIT ?3",
        TASK_COLUMNS
    ))?;
    let mut tasks = stmt
        .query_map(params![STATE_PENDING, now, limit as i64], task_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut lease = conn.prepare_cached(
        "UPDATE scheduled_tasks SET locked_until = ?1, attempts = attempts + 1 WHERE id = ?2",
    )?;
    for task in &mut tasks {
        lease.execute(params![now + lease_ms, task.id])?;
        task.locked_until = Some(now + lease_ms);
        task.attempts += 1;
    }

    Ok(tasks)
}

/// Acknowledge a task whose handler committed.
pub fn complete_task(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM scheduled_tasks WHERE id = ?1", [id])?;
    Ok(())
}

/// Release a failed task for another attempt at `retry_at`, or park it as
/// `failed` for good when `retry_at` is `None`.
pub fn fail_task(conn: &Connection, id: &str, error: &str, retry_at: Option<i64>) -> Result<()> {
    match retry_at {
        Some(run_at) => conn.execute(
            "UPDATE scheduled_tasks SET run_at = ?1, locked_until = NULL, last_error = ?2 WHERE id = ?3",
            params![run_at, error, id],
        )?,
        None => conn.execute(
            "UPDATE scheduled_tasks SET state = ?1, locked_until = NULL, last_error = ?2 WHERE id = ?3",
            params![STATE_FAILED, error, id],
        )?,
    };
    Ok(())
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledTaskRow> {
    Ok(ScheduledTaskRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        payload: row.get(2)?,
        run_at: row.get(3)?,
        attempts: row.get(4)?,
        locked_until: row.get(5)?,
        state: row.get(6)?,
        last_error: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_respects_run_at_and_lease() {
        let db = Database::open_in_memory().unwrap();
        db.with_tx(|conn| -> Result<()> {
            enqueue_task(conn, "k", "{}", 100, 0)?;
            enqueue_task(conn, "k", "{}", 500, 0)?;
            Ok(())
        })
        .unwrap();

        let claimed = db.with_tx(|conn| claim_due_tasks(conn, 200, 1_000, 10)).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].attempts, 1);

        // Leased: invisible until the lease lapses.
        assert!(db.with_tx(|conn| claim_due_tasks(conn, 300, 1_000, 10)).unwrap().is_empty());

        // Lease expired without an ack: redelivered alongside the later task.
        let again = db.with_tx(|conn| claim_due_tasks(conn, 1_200, 1_000, 10)).unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(again[0].id, claimed[0].id);
        assert_eq!(again[0].attempts, 2);
    }

    #[test]
    fn test_complete_and_fail() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = db
            .with_tx(|conn| -> Result<(String, String)> {
                Ok((enqueue_task(conn, "k", "{}", 0, 0)?, enqueue_task(conn, "k", "{}", 0, 0)?))
            })
            .unwrap();
        assert_eq!(db.pending_task_count().unwrap(), 2);

        db.with_tx(|conn| complete_task(conn, &a)).unwrap();
        assert_eq!(db.pending_task_count().unwrap(), 1);

        db.with_tx(|conn| fail_task(conn, &b, "transient", Some(50))).unwrap();
        assert!(db.with_tx(|conn| claim_due_tasks(conn, 10, 100, 10)).unwrap().is_empty());
        assert_eq!(db.with_tx(|conn| claim_due_tasks(conn, 50, 100, 10)).unwrap().len(), 1);

        db.with_tx(|conn| fail_task(conn, &b, "gave up", None)).unwrap();
        assert_eq!(db.pending_task_count().unwrap(), 0);
        let failed = db.failed_tasks().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].last_error.as_deref(), Some("gave up"));
    }
}
