use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row, params};

use hearth_types::models::{DeletionStatus, DeletionTargetKind};

use crate::models::DeletionOperationRow;
use crate::{Database, OptionalExt, new_id};

const DELETION_COLUMNS: &str = "id, target_kind, requester_id, server_id, channel_id, status,
     deleted_messages, deleted_channels, deleted_memberships, deleted_servers,
     created_at, updated_at, completed_at";

impl Database {
    pub fn get_deletion_operation(&self, id: &str) -> Result<Option<DeletionOperationRow>> {
        self.with_conn(|conn| query_deletion_operation(conn, id))
    }
}

/// Insert a fresh `in_progress` operation with zeroed counters.
pub fn insert_deletion_operation(
    conn: &Connection,
    target_kind: DeletionTargetKind,
    requester_id: &str,
    server_id: &str,
    channel_id: Option<&str>,
    now: i64,
) -> Result<DeletionOperationRow> {
    let row = DeletionOperationRow {
        id: new_id(),
        target_kind,
        requester_id: requester_id.to_string(),
        server_id: server_id.to_string(),
        channel_id: channel_id.map(str::to_string),
        status: DeletionStatus::InProgress,
        deleted_messages: 0,
        deleted_channels: 0,
        deleted_memberships: 0,
        deleted_servers: 0,
        created_at: now,
        updated_at: now,
        completed_at: None,
    };

    conn.execute(
        "INSERT INTO deletion_operations
             (id, target_kind, target_id, requester_id, server_id, channel_id, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            row.id,
            row.target_kind.as_str(),
            row.target_id(),
            row.requester_id,
            row.server_id,
            row.channel_id,
            row.status.as_str(),
            now,
        ],
    )?;

    Ok(row)
}

pub fn query_deletion_operation(conn: &Connection, id: &str) -> Result<Option<DeletionOperationRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM deletion_operations WHERE id = ?1",
        DELETION_COLUMNS
    ))?;
    stmt.query_row([id], deletion_from_row).optional()?.transpose()
}

/// Most recently updated operation for a target, optionally restricted to
/// one status. Newest first, limit one.
pub fn latest_deletion_for_target(
    conn: &Connection,
    target_id: &str,
    status: Option<DeletionStatus>,
) -> Result<Option<DeletionOperationRow>> {
    let found = match status {
        Some(status) => {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM deletion_operations
                 WHERE target_id = ?1 AND status = ?2
                 ORDER BY updated_at DESC, rowid DESC
                 LIMIT 1",
                DELETION_COLUMNS
            ))?;
            stmt.query_row([target_id, status.as_str()], deletion_from_row).optional()?
        }
        None => {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM deletion_operations
                 WHERE target_id = ?1
                 ORDER BY updated_at DESC, rowid DESC
                 LIMIT 1",
                DELETION_COLUMNS
            ))?;
            stmt.query_row([target_id], deletion_from_row).optional()?
        }
    };
    found.transpose()
}

/// Persist counters, status, and timestamps of an operation.
pub fn save_deletion_progress(conn: &Connection, op: &DeletionOperationRow) -> Result<()> {
    let changed = conn.execute(
        "UPDATE deletion_operations
         SET status = ?1,
             deleted_messages = ?2,
             deleted_channels = ?3,
             deleted_memberships = ?4,
             deleted_servers = ?5,
             updated_at = ?6,
             completed_at = ?7
         WHERE id = ?8",
        params![
            op.status.as_str(),
            op.deleted_messages,
            op.deleted_channels,
            op.deleted_memberships,
            op.deleted_servers,
            op.updated_at,
            op.completed_at,
            op.id,
        ],
    )?;
    if changed == 0 {
        return Err(anyhow!("Deletion operation vanished: {}", op.id));
    }
    Ok(())
}

/// Rows decode in two stages: SQLite values first, then the enum columns,
/// so a corrupt status string surfaces as an error instead of a panic.
fn deletion_from_row(row: &Row<'_>) -> rusqlite::Result<Result<DeletionOperationRow>> {
    let target_kind: String = row.get(1)?;
    let status: String = row.get(5)?;

    let target_kind = match target_kind.parse::<DeletionTargetKind>() {
        Ok(kind) => kind,
        Err(e) => return Ok(Err(anyhow!(e))),
    };
    let status = match status.parse::<DeletionStatus>() {
        Ok(status) => status,
        Err(e) => return Ok(Err(anyhow!(e))),
    };

    Ok(Ok(DeletionOperationRow {
        id: row.get(0)?,
        target_kind,
        requester_id: row.get(2)?,
        server_id: row.get(3)?,
        channel_id: row.get(4)?,
        status,
        deleted_messages: row.get(6)?,
        deleted_channels: row.get(7)?,
        deleted_memberships: row.get(8)?,
        deleted_servers: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        completed_at: row.get(12)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_prefers_most_recent_update() {
        let db = Database::open_in_memory().unwrap();
        db.with_tx(|conn| -> Result<()> {
            let mut older = insert_deletion_operation(conn, DeletionTargetKind::Server, "u1", "s1", None, 100)?;
            let newer = insert_deletion_operation(conn, DeletionTargetKind::Server, "u1", "s1", None, 200)?;
            insert_deletion_operation(conn, DeletionTargetKind::Server, "u1", "s2", None, 900)?;

            let latest = latest_deletion_for_target(conn, "s1", None)?.unwrap();
            assert_eq!(latest.id, newer.id);

            older.updated_at = 300;
            older.status = DeletionStatus::Completed;
            older.completed_at = Some(300);
            save_deletion_progress(conn, &older)?;

            assert_eq!(latest_deletion_for_target(conn, "s1", None)?.unwrap().id, older.id);
            let in_progress = latest_deletion_for_target(conn, "s1", Some(DeletionStatus::InProgress))?;
            assert_eq!(in_progress.unwrap().id, newer.id);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_channel_operations_indexed_by_channel() {
        let db = Database::open_in_memory().unwrap();
        let op = db
            .with_tx(|conn| {
                insert_deletion_operation(conn, DeletionTargetKind::Channel, "u1", "s1", Some("c1"), 10)
            })
            .unwrap();

        assert_eq!(op.target_id(), "c1");
        let found = db
            .with_conn(|conn| latest_deletion_for_target(conn, "c1", Some(DeletionStatus::InProgress)))
            .unwrap()
            .unwrap();
        assert_eq!(found, op);
        assert!(db.with_conn(|conn| latest_deletion_for_target(conn, "s1", None)).unwrap().is_none());
        assert_eq!(db.get_deletion_operation(&op.id).unwrap().unwrap(), op);
    }

    #[test]
    fn test_save_missing_operation_fails() {
        let db = Database::open_in_memory().unwrap();
        let mut op = db
            .with_tx(|conn| insert_deletion_operation(conn, DeletionTargetKind::Server, "u1", "s1", None, 10))
            .unwrap();
        op.id = "ghost".to_string();
        assert!(db.with_tx(|conn| save_deletion_progress(conn, &op)).is_err());
    }
}
