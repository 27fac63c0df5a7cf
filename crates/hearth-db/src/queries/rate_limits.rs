use anyhow::Result;
use rusqlite::{Connection, Row, params};

use crate::models::RateLimitRow;
use crate::{Database, janitor, new_id};

const RATE_LIMIT_COLUMNS: &str = "id, rowid, action, key, window_start, count, updated_at";

/// Outcome of one rate-limited attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Milliseconds until the current window resets; 0 when allowed.
    pub retry_after_ms: i64,
}

impl Database {
    /// Count one attempt of `action` for `key` in a fixed window.
    pub fn consume_rate_limit(
        &self,
        action: &str,
        key: &str,
        max: u32,
        window_ms: i64,
        now: i64,
    ) -> Result<RateLimitDecision> {
        self.with_tx(|conn| {
            let rows = query_rate_limits(conn, action, key)?;
            let Some(counter) = janitor::reconcile(conn, rows)? else {
                insert_rate_limit(conn, action, key, now, 1)?;
                return Ok(RateLimitDecision {
                    allowed: true,
                    remaining: max.saturating_sub(1),
                    retry_after_ms: 0,
                });
            };

            let window_end = counter.window_start + window_ms;
            if now >= window_end {
                conn.execute(
                    "UPDATE rate_limits SET window_start = ?1, count = 1, updated_at = ?1 WHERE id = ?2",
                    params![now, counter.id],
                )?;
                return Ok(RateLimitDecision {
                    allowed: true,
                    remaining: max.saturating_sub(1),
                    retry_after_ms: 0,
                });
            }

            if counter.count >= i64::from(max) {
                return Ok(RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    retry_after_ms: window_end - now,
                });
            }

            let count = counter.count + 1;
            conn.execute(
                "UPDATE rate_limits SET count = ?1, updated_at = ?2 WHERE id = ?3",
                params![count, now, counter.id],
            )?;
            Ok(RateLimitDecision {
                allowed: true,
                remaining: (i64::from(max) - count).max(0) as u32,
                retry_after_ms: 0,
            })
        })
    }

    /// Drop up to `limit` counters untouched since `cutoff`.
    pub fn delete_stale_rate_limits(&self, cutoff: i64, limit: usize) -> Result<usize> {
        self.with_tx(|conn| {
            Ok(conn.execute(
                "DELETE FROM rate_limits WHERE id IN (
                     SELECT id FROM rate_limits WHERE updated_at < ?1 LIMIT ?2
                 )",
                params![cutoff, limit as i64],
            )?)
        })
    }
}

pub(crate) fn insert_rate_limit(
    conn: &Connection,
    action: &str,
    key: &str,
    now: i64,
    count: i64,
) -> Result<RateLimitRow> {
    let id = new_id();
    conn.execute(
        "INSERT INTO rate_limits (id, action, key, window_start, count, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?4)",
        params![id, action, key, now, count],
    )?;

    Ok(RateLimitRow {
        id,
        seq: conn.last_insert_rowid(),
        action: action.to_string(),
        key: key.to_string(),
        window_start: now,
        count,
        updated_at: now,
    })
}

pub fn query_rate_limits(conn: &Connection, action: &str, key: &str) -> Result<Vec<RateLimitRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM rate_limits WHERE action = ?1 AND key = ?2",
        RATE_LIMIT_COLUMNS
    ))?;
    let rows = stmt
        .query_map([action, key], rate_limit_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn rate_limit_from_row(row: &Row<'_>) -> rusqlite::Result<RateLimitRow> {
    Ok(RateLimitRow {
        id: row.get(0)?,
        seq: row.get(1)?,
        action: row.get(2)?,
        key: row.get(3)?,
        window_start: row.get(4)?,
        count: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
