use anyhow::Result;
use rusqlite::{Connection, Row, params};

use crate::models::AuthAccountRow;
use crate::reconcile::into_canonical;
use crate::{Database, InsertOutcome, janitor, new_id};

const ACCOUNT_COLUMNS: &str =
    "id, rowid, user_id, provider, provider_account_id, last_used_at, created_at";

impl Database {
    /// Link `(provider, subject)` to `user_id`, or touch the existing link.
    ///
    /// An existing link is returned with its owner. Only the owner relinking
    /// refreshes `last_used_at`; callers must check `user_id` before trusting it.
    pub fn link_provider_account(
        &self,
        user_id: &str,
        provider: &str,
        subject: &str,
        now: i64,
    ) -> Result<InsertOutcome<AuthAccountRow>> {
        self.with_tx(|conn| {
            let rows = query_accounts_by_provider(conn, provider, subject)?;
            if let Some(mut existing) = janitor::reconcile(conn, rows)? {
                if existing.user_id == user_id {
                    conn.execute(
                        "UPDATE auth_accounts SET last_used_at = ?1 WHERE id = ?2",
                        params![now, existing.id],
                    )?;
                    existing.last_used_at = now;
                }
                return Ok(InsertOutcome::Existing(existing));
            }
            Ok(InsertOutcome::Created(insert_account(conn, user_id, provider, subject, now)?))
        })
    }

    pub fn get_provider_account(&self, provider: &str, subject: &str) -> Result<Option<AuthAccountRow>> {
        self.with_conn(|conn| Ok(into_canonical(query_accounts_by_provider(conn, provider, subject)?)))
    }
}

pub(crate) fn insert_account(
    conn: &Connection,
    user_id: &str,
    provider: &str,
    subject: &str,
    now: i64,
) -> Result<AuthAccountRow> {
    let id = new_id();
    conn.execute(
        "INSERT INTO auth_accounts (id, user_id, provider, provider_account_id, last_used_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![id, user_id, provider, subject, now],
    )?;

    Ok(AuthAccountRow {
        id,
        seq: conn.last_insert_rowid(),
        user_id: user_id.to_string(),
        provider: provider.to_string(),
        provider_account_id: subject.to_string(),
        last_used_at: now,
        created_at: now,
    })
}

pub fn query_accounts_by_provider(
    conn: &Connection,
    provider: &str,
    subject: &str,
) -> Result<Vec<AuthAccountRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM auth_accounts WHERE provider = ?1 AND provider_account_id = ?2",
        ACCOUNT_COLUMNS
    ))?;
    let rows = stmt
        .query_map([provider, subject], account_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<AuthAccountRow> {
    Ok(AuthAccountRow {
        id: row.get(0)?,
        seq: row.get(1)?,
        user_id: row.get(2)?,
        provider: row.get(3)?,
        provider_account_id: row.get(4)?,
        last_used_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}
