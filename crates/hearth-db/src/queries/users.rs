use anyhow::Result;
use rusqlite::{Connection, Row, params};

use crate::keys::normalize_username;
use crate::models::UserRow;
use crate::reconcile::into_canonical;
use crate::{Database, InsertOutcome, OptionalExt, janitor, new_id, now_ms};

const USER_COLUMNS: &str = "id, rowid, username, username_normalized, password, created_at";

impl Database {
    /// Create an account unless the normalized username is already taken.
    /// Duplicate rows left by an earlier race are cleaned up on the way.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<InsertOutcome<UserRow>> {
        self.with_tx(|conn| create_user_in(conn, username, password_hash, now_ms()))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let rows = query_users_by_username(conn, &normalize_username(username))?;
            Ok(into_canonical(rows))
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }
}

pub fn create_user_in(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    now: i64,
) -> Result<InsertOutcome<UserRow>> {
    let rows = query_users_by_username(conn, &normalize_username(username))?;
    if let Some(existing) = janitor::reconcile(conn, rows)? {
        return Ok(InsertOutcome::Existing(existing));
    }
    Ok(InsertOutcome::Created(insert_user(conn, username, password_hash, now)?))
}

/// Raw insert with no natural-key check.
pub(crate) fn insert_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    created_at: i64,
) -> Result<UserRow> {
    let id = new_id();
    let normalized = normalize_username(username);
    conn.execute(
        "INSERT INTO users (id, username, username_normalized, password, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, username, normalized, password_hash, created_at],
    )?;

    Ok(UserRow {
        id,
        seq: conn.last_insert_rowid(),
        username: username.to_string(),
        username_normalized: normalized,
        password: password_hash.to_string(),
        created_at,
    })
}

pub fn query_users_by_username(conn: &Connection, normalized: &str) -> Result<Vec<UserRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM users WHERE username_normalized = ?1",
        USER_COLUMNS
    ))?;
    let rows = stmt
        .query_map([normalized], user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))?;
    stmt.query_row([id], user_from_row).optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        seq: row.get(1)?,
        username: row.get(2)?,
        username_normalized: row.get(3)?,
        password: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();

        let first = db.create_user("Alice", "h1").unwrap();
        assert!(first.is_created());

        let second = db.create_user(" alice ", "h2").unwrap();
        assert!(!second.is_created());
        assert_eq!(second.into_inner().id, first.into_inner().id);
    }

    #[test]
    fn test_create_user_collapses_raced_duplicates() {
        let db = Database::open_in_memory().unwrap();

        // Two writers that both saw "no row yet".
        db.with_tx(|conn| -> Result<()> {
            insert_user(conn, "alice", "older", 100)?;
            insert_user(conn, "alice", "newer", 200)?;
            Ok(())
        })
        .unwrap();

        let reader_view = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(reader_view.password, "newer");

        let outcome = db.create_user("ALICE", "third").unwrap();
        assert_eq!(outcome.into_inner().password, "newer");

        let rows = db.with_conn(|conn| query_users_by_username(conn, "alice")).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_lookup_by_id() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("bob", "h").unwrap().into_inner();
        assert_eq!(db.get_user_by_id(&user.id).unwrap().unwrap().username, "bob");
        assert!(db.get_user_by_id("nope").unwrap().is_none());
    }
}
