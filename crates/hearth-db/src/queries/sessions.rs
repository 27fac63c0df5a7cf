use anyhow::Result;
use rusqlite::{Connection, Row, params};

use crate::models::SessionRow;
use crate::reconcile::into_canonical;
use crate::{Database, janitor, new_id, now_ms};

const SESSION_COLUMNS: &str = "id, rowid, user_id, token_hash, expires_at, created_at";

impl Database {
    /// Record a session for `token_hash`. A retried login that lands on an
    /// existing hash extends that session instead of adding a second row.
    pub fn create_session(&self, user_id: &str, token_hash: &str, expires_at: i64) -> Result<SessionRow> {
        self.with_tx(|conn| {
            let rows = query_sessions_by_token(conn, token_hash)?;
            if let Some(mut existing) = janitor::reconcile(conn, rows)? {
                if expires_at > existing.expires_at {
                    conn.execute(
                        "UPDATE sessions SET expires_at = ?1 WHERE id = ?2",
                        params![expires_at, existing.id],
                    )?;
                    existing.expires_at = expires_at;
                }
                return Ok(existing);
            }
            insert_session(conn, user_id, token_hash, expires_at, now_ms())
        })
    }

    /// The live session for a token hash, if any.
    pub fn get_session(&self, token_hash: &str, now: i64) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            let rows = query_sessions_by_token(conn, token_hash)?;
            Ok(into_canonical(rows).filter(|s| s.expires_at > now))
        })
    }

    /// Logout: drop every row for the hash, canonical or not.
    pub fn delete_sessions(&self, token_hash: &str) -> Result<usize> {
        self.with_tx(|conn| Ok(conn.execute("DELETE FROM sessions WHERE token_hash = ?1", [token_hash])?))
    }

    /// Remove up to `limit` sessions that expired before `now`.
    pub fn delete_expired_sessions(&self, now: i64, limit: usize) -> Result<usize> {
        self.with_tx(|conn| {
            Ok(conn.execute(
                "DELETE FROM sessions WHERE id IN (
                     SELECT id FROM sessions WHERE expires_at <= ?1 LIMIT ?2
                 )",
                params![now, limit as i64],
            )?)
        })
    }
}

pub(crate) fn insert_session(
    conn: &Connection,
    user_id: &str,
    token_hash: &str,
    expires_at: i64,
    created_at: i64,
) -> Result<SessionRow> {
    let id = new_id();
    conn.execute(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user_id, token_hash, expires_at, created_at],
    )?;

    Ok(SessionRow {
        id,
        seq: conn.last_insert_rowid(),
        user_id: user_id.to_string(),
        token_hash: token_hash.to_string(),
        expires_at,
        created_at,
    })
}

pub fn query_sessions_by_token(conn: &Connection, token_hash: &str) -> Result<Vec<SessionRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM sessions WHERE token_hash = ?1",
        SESSION_COLUMNS
    ))?;
    let rows = stmt
        .query_map([token_hash], session_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        seq: row.get(1)?,
        user_id: row.get(2)?,
        token_hash: row.get(3)?,
        expires_at: row.get(4)?,
        created_at: row.get(5)?,
    })
}
