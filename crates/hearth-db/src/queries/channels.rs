use anyhow::Result;
use rusqlite::{Connection, Row, params};

use crate::keys::normalize_channel_name;
use crate::models::ChannelRow;
use crate::reconcile::into_canonical;
use crate::{Database, InsertOutcome, OptionalExt, janitor, new_id, now_ms};

const CHANNEL_COLUMNS: &str = "id, rowid, server_id, name, name_normalized, creator_id, created_at";

impl Database {
    /// Create a channel unless the server already has one with the same
    /// normalized name.
    pub fn create_channel(
        &self,
        server_id: &str,
        creator_id: &str,
        name: &str,
    ) -> Result<InsertOutcome<ChannelRow>> {
        self.with_tx(|conn| {
            let rows = query_channels_by_name(conn, server_id, &normalize_channel_name(name))?;
            if let Some(existing) = janitor::reconcile(conn, rows)? {
                return Ok(InsertOutcome::Existing(existing));
            }
            Ok(InsertOutcome::Created(insert_channel(conn, server_id, creator_id, name, now_ms())?))
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| query_channel(conn, id))
    }

    pub fn get_channel_by_name(&self, server_id: &str, name: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let rows = query_channels_by_name(conn, server_id, &normalize_channel_name(name))?;
            Ok(into_canonical(rows))
        })
    }

    /// Channels of a server in creation order. Duplicate names that have not
    /// been reconciled yet are hidden behind their canonical row.
    pub fn list_channels(&self, server_id: &str) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM channels WHERE server_id = ?1 ORDER BY name_normalized, rowid",
                CHANNEL_COLUMNS
            ))?;
            let rows = stmt
                .query_map([server_id], channel_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut channels: Vec<ChannelRow> = Vec::new();
            let mut group: Vec<ChannelRow> = Vec::new();
            for row in rows {
                if group.last().is_some_and(|g| g.name_normalized != row.name_normalized) {
                    channels.extend(into_canonical(std::mem::take(&mut group)));
                }
                group.push(row);
            }
            channels.extend(into_canonical(group));
            channels.sort_by_key(|c| (c.created_at, c.seq));
            Ok(channels)
        })
    }
}

pub(crate) fn insert_channel(
    conn: &Connection,
    server_id: &str,
    creator_id: &str,
    name: &str,
    created_at: i64,
) -> Result<ChannelRow> {
    let id = new_id();
    let normalized = normalize_channel_name(name);
    conn.execute(
        "INSERT INTO channels (id, server_id, name, name_normalized, creator_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, server_id, name, normalized, creator_id, created_at],
    )?;

    Ok(ChannelRow {
        id,
        seq: conn.last_insert_rowid(),
        server_id: server_id.to_string(),
        name: name.to_string(),
        name_normalized: normalized,
        creator_id: creator_id.to_string(),
        created_at,
    })
}

pub fn query_channel(conn: &Connection, id: &str) -> Result<Option<ChannelRow>> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {} FROM channels WHERE id = ?1", CHANNEL_COLUMNS))?;
    stmt.query_row([id], channel_from_row).optional()
}

pub fn query_channels_by_name(conn: &Connection, server_id: &str, normalized: &str) -> Result<Vec<ChannelRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM channels WHERE server_id = ?1 AND name_normalized = ?2",
        CHANNEL_COLUMNS
    ))?;
    let rows = stmt
        .query_map([server_id, normalized], channel_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Bounded scan used by cascading deletion, oldest first.
pub fn channel_ids_in_server(conn: &Connection, server_id: &str, limit: usize) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare_cached("SELECT id FROM channels WHERE server_id = ?1 ORDER BY rowid LIMIT ?2")?;
    let ids = stmt
        .query_map(params![server_id, limit as i64], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        seq: row.get(1)?,
        server_id: row.get(2)?,
        name: row.get(3)?,
        name_normalized: row.get(4)?,
        creator_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}
