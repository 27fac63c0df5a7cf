use std::collections::BTreeSet;

use anyhow::Result;
use rusqlite::{Connection, Row, params};

use crate::keys::friendship_pair;
use crate::models::FriendshipRow;
use crate::reconcile::into_canonical;
use crate::{Database, InsertOutcome, janitor, new_id, now_ms};

const FRIENDSHIP_COLUMNS: &str = "id, rowid, user_low, user_high, created_at";

impl Database {
    pub fn create_friendship(&self, a: &str, b: &str) -> Result<InsertOutcome<FriendshipRow>> {
        self.with_tx(|conn| {
            let (low, high) = friendship_pair(a, b);
            let rows = query_friendships_by_pair(conn, low, high)?;
            if let Some(existing) = janitor::reconcile(conn, rows)? {
                return Ok(InsertOutcome::Existing(existing));
            }
            Ok(InsertOutcome::Created(insert_friendship(conn, a, b, now_ms())?))
        })
    }

    pub fn get_friendship(&self, a: &str, b: &str) -> Result<Option<FriendshipRow>> {
        let (low, high) = friendship_pair(a, b);
        self.with_conn(|conn| Ok(into_canonical(query_friendships_by_pair(conn, low, high)?)))
    }

    /// Removes every row for the pair, including unreconciled duplicates.
    pub fn delete_friendship(&self, a: &str, b: &str) -> Result<usize> {
        let (low, high) = friendship_pair(a, b);
        self.with_tx(|conn| {
            Ok(conn.execute(
                "DELETE FROM friendships WHERE user_low = ?1 AND user_high = ?2",
                [low, high],
            )?)
        })
    }

    /// Friend ids of `user_id`; duplicate pair rows collapse to one entry.
    pub fn list_friends(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM friendships WHERE user_low = ?1
                 UNION ALL
                 SELECT {} FROM friendships WHERE user_high = ?1",
                FRIENDSHIP_COLUMNS, FRIENDSHIP_COLUMNS
            ))?;
            let rows = stmt
                .query_map([user_id], friendship_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let friends: BTreeSet<String> = rows.iter().map(|r| r.other(user_id).to_string()).collect();
            Ok(friends.into_iter().collect())
        })
    }
}

pub(crate) fn insert_friendship(conn: &Connection, a: &str, b: &str, created_at: i64) -> Result<FriendshipRow> {
    let (low, high) = friendship_pair(a, b);
    let id = new_id();
    conn.execute(
        "INSERT INTO friendships (id, user_low, user_high, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![id, low, high, created_at],
    )?;

    Ok(FriendshipRow {
        id,
        seq: conn.last_insert_rowid(),
        user_low: low.to_string(),
        user_high: high.to_string(),
        created_at,
    })
}

pub fn query_friendships_by_pair(conn: &Connection, low: &str, high: &str) -> Result<Vec<FriendshipRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM friendships WHERE user_low = ?1 AND user_high = ?2",
        FRIENDSHIP_COLUMNS
    ))?;
    let rows = stmt
        .query_map([low, high], friendship_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn friendship_from_row(row: &Row<'_>) -> rusqlite::Result<FriendshipRow> {
    Ok(FriendshipRow {
        id: row.get(0)?,
        seq: row.get(1)?,
        user_low: row.get(2)?,
        user_high: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_unordered() {
        let db = Database::open_in_memory().unwrap();
        let first = db.create_friendship("u2", "u1").unwrap();
        assert!(first.is_created());

        let again = db.create_friendship("u1", "u2").unwrap();
        assert!(!again.is_created());
        assert_eq!(again.into_inner().id, first.into_inner().id);

        assert!(db.get_friendship("u1", "u2").unwrap().is_some());
        assert_eq!(db.list_friends("u1").unwrap(), vec!["u2".to_string()]);
        assert_eq!(db.list_friends("u2").unwrap(), vec!["u1".to_string()]);
    }

    #[test]
    fn test_raced_inserts_from_both_sides_converge() {
        let db = Database::open_in_memory().unwrap();
        db.with_tx(|conn| -> Result<()> {
            insert_friendship(conn, "u1", "u2", 100)?;
            insert_friendship(conn, "u2", "u1", 200)?;
            insert_friendship(conn, "u1", "u3", 50)?;
            Ok(())
        })
        .unwrap();

        // Readers see one friend per pair even before cleanup.
        assert_eq!(db.list_friends("u1").unwrap(), vec!["u2".to_string(), "u3".to_string()]);

        let kept = db.create_friendship("u1", "u2").unwrap().into_inner();
        assert_eq!(kept.created_at, 200);
        let rows = db
            .with_conn(|conn| query_friendships_by_pair(conn, "u1", "u2"))
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_delete_removes_all_rows_for_pair() {
        let db = Database::open_in_memory().unwrap();
        db.with_tx(|conn| -> Result<()> {
            insert_friendship(conn, "u1", "u2", 1)?;
            insert_friendship(conn, "u1", "u2", 2)?;
            Ok(())
        })
        .unwrap();

        assert_eq!(db.delete_friendship("u2", "u1").unwrap(), 2);
        assert!(db.get_friendship("u1", "u2").unwrap().is_none());
    }
}
