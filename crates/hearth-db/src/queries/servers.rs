use anyhow::Result;
use rusqlite::{Connection, Row, params};

use crate::models::{MembershipRow, ServerRow};
use crate::{Database, OptionalExt, new_id, now_ms};

impl Database {
    // -- Servers --

    /// The owner is recorded on the server row itself and gets no membership row.
    pub fn create_server(&self, owner_id: &str, name: &str) -> Result<ServerRow> {
        self.with_tx(|conn| {
            let row = ServerRow {
                id: new_id(),
                name: name.to_string(),
                owner_id: owner_id.to_string(),
                created_at: now_ms(),
            };
            conn.execute(
                "INSERT INTO servers (id, name, owner_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![row.id, row.name, row.owner_id, row.created_at],
            )?;
            Ok(row)
        })
    }

    pub fn get_server(&self, id: &str) -> Result<Option<ServerRow>> {
        self.with_conn(|conn| query_server(conn, id))
    }

    // -- Memberships --

    /// Join a server. Returns `false` when the user already belongs to it.
    pub fn add_member(&self, server_id: &str, user_id: &str) -> Result<bool> {
        self.with_tx(|conn| {
            if query_membership(conn, server_id, user_id)?.is_some() {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO memberships (id, server_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![new_id(), server_id, user_id, now_ms()],
            )?;
            Ok(true)
        })
    }

    /// Owners count as members.
    pub fn is_member(&self, server_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let Some(server) = query_server(conn, server_id)? else {
                return Ok(false);
            };
            Ok(server.owner_id == user_id || query_membership(conn, server_id, user_id)?.is_some())
        })
    }
}

pub fn query_server(conn: &Connection, id: &str) -> Result<Option<ServerRow>> {
    let mut stmt =
        conn.prepare_cached("SELECT id, name, owner_id, created_at FROM servers WHERE id = ?1")?;
    stmt.query_row([id], server_from_row).optional()
}

pub fn query_membership(conn: &Connection, server_id: &str, user_id: &str) -> Result<Option<MembershipRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, server_id, user_id, created_at FROM memberships
         WHERE server_id = ?1 AND user_id = ?2
         LIMIT 1",
    )?;
    stmt.query_row([server_id, user_id], |row| {
        Ok(MembershipRow {
            id: row.get(0)?,
            server_id: row.get(1)?,
            user_id: row.get(2)?,
            created_at: row.get(3)?,
        })
    })
    .optional()
}

/// Bounded scan used by cascading deletion.
pub fn membership_ids_in_server(conn: &Connection, server_id: &str, limit: usize) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached("SELECT id FROM memberships WHERE server_id = ?1 LIMIT ?2")?;
    let ids = stmt
        .query_map(params![server_id, limit as i64], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn server_from_row(row: &Row<'_>) -> rusqlite::Result<ServerRow> {
    Ok(ServerRow {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}
