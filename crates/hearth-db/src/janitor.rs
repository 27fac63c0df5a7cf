use anyhow::Result;
use rusqlite::Connection;
use tracing::warn;

use crate::delete_rows;
use crate::reconcile::{self, Reconcilable};

/// Converge a natural key onto one row.
///
/// `rows` must be the complete result of the natural-key index scan, taken on
/// `conn` inside the caller's transaction. Every row except the canonical one
/// is deleted; the canonical row is returned untouched. Returns `None` when
/// the scan was empty.
pub fn reconcile<T: Reconcilable>(conn: &Connection, rows: Vec<T>) -> Result<Option<T>> {
    let Some((canonical, losers)) = reconcile::split_canonical(rows) else {
        return Ok(None);
    };

    if !losers.is_empty() {
        let ids: Vec<String> = losers.iter().map(|row| row.id().to_string()).collect();
        delete_rows(conn, T::TABLE, &ids)?;
        warn!(
            table = T::TABLE,
            canonical = canonical.id(),
            removed = losers.len(),
            "Removed duplicate rows for natural key"
        );
    }

    Ok(Some(canonical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::queries::users::{insert_user, query_users_by_username};

    #[test]
    fn test_keeps_canonical_and_deletes_losers() {
        let db = Database::open_in_memory().unwrap();

        let survivor = db
            .with_tx(|conn| -> Result<Option<String>> {
                insert_user(conn, "Alice", "h1", 100)?;
                insert_user(conn, "alice", "h2", 300)?;
                insert_user(conn, "ALICE", "h3", 200)?;

                let rows = query_users_by_username(conn, "alice")?;
                assert_eq!(rows.len(), 3);
                Ok(reconcile(conn, rows)?.map(|u| u.password))
            })
            .unwrap();
        assert_eq!(survivor.as_deref(), Some("h2"));

        let rows = db.with_conn(|conn| query_users_by_username(conn, "alice")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].password, "h2");
    }

    #[test]
    fn test_leaves_other_keys_alone() {
        let db = Database::open_in_memory().unwrap();

        db.with_tx(|conn| -> Result<()> {
            insert_user(conn, "alice", "a1", 1)?;
            insert_user(conn, "alice", "a2", 2)?;
            insert_user(conn, "bob", "b1", 1)?;
            let rows = query_users_by_username(conn, "alice")?;
            reconcile(conn, rows)?;
            Ok(())
        })
        .unwrap();

        let bob = db.with_conn(|conn| query_users_by_username(conn, "bob")).unwrap();
        assert_eq!(bob.len(), 1);
    }

    #[test]
    fn test_empty_scan_is_noop() {
        let db = Database::open_in_memory().unwrap();
        let out = db
            .with_tx(|conn| -> Result<bool> {
                let rows = query_users_by_username(conn, "nobody")?;
                Ok(reconcile(conn, rows)?.is_some())
            })
            .unwrap();
        assert!(!out);
    }
}
