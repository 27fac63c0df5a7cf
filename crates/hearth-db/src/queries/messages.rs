use anyhow::Result;
use rusqlite::{Connection, params};

use crate::models::MessageRow;
use crate::{Database, new_id, now_ms};

impl Database {
    pub fn insert_message(&self, channel_id: &str, author_id: &str, body: &str) -> Result<MessageRow> {
        let id = new_id();
        let created_at = now_ms();
        self.with_tx(|conn| -> Result<()> {
            conn.execute(
                "INSERT INTO messages (id, channel_id, author_id, body, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, channel_id, author_id, body, created_at],
            )?;
            Ok(())
        })?;

        let author_username = self
            .get_user_by_id(author_id)?
            .map(|u| u.username)
            .unwrap_or_else(|| "unknown".to_string());

        Ok(MessageRow {
            id,
            channel_id: channel_id.to_string(),
            author_id: author_id.to_string(),
            author_username,
            body: body.to_string(),
            created_at,
        })
    }

    /// Newest first. `before` is an exclusive `created_at` cursor.
    pub fn get_messages(&self, channel_id: &str, limit: u32, before: Option<i64>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, channel_id, limit, before))
    }
}

fn query_messages(conn: &Connection, channel_id: &str, limit: u32, before: Option<i64>) -> Result<Vec<MessageRow>> {
    // JOIN users to fetch author_username in a single query (eliminates N+1)
    let mut stmt = conn.prepare_cached(
        "SELECT m.id, m.channel_id, m.author_id, u.username, m.body, m.created_at
         FROM messages m
         LEFT JOIN users u ON m.author_id = u.id
         WHERE m.channel_id = ?1 AND m.created_at < ?2
         ORDER BY m.created_at DESC, m.rowid DESC
         LIMIT ?3",
    )?;

    let rows = stmt
        .query_map(params![channel_id, before.unwrap_or(i64::MAX), limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                channel_id: row.get(1)?,
                author_id: row.get(2)?,
                author_username: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
                body: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Bounded scan used by cascading deletion.
pub fn message_ids_in_channel(conn: &Connection, channel_id: &str, limit: usize) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached("SELECT id FROM messages WHERE channel_id = ?1 LIMIT ?2")?;
    let ids = stmt
        .query_map(params![channel_id, limit as i64], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Bounded scan across every channel of a server.
pub fn message_ids_in_server(conn: &Connection, server_id: &str, limit: usize) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM messages WHERE channel_id IN (SELECT id FROM channels WHERE server_id = ?1) LIMIT ?2",
    )?;
    let ids = stmt
        .query_map(params![server_id, limit as i64], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_newest_first_with_cursor() {
        let db = Database::open_in_memory().unwrap();
        let author = db.create_user("alice", "h").unwrap().into_inner();

        db.with_tx(|conn| -> Result<()> {
            for (i, ts) in [100i64, 200, 300].iter().enumerate() {
                conn.execute(
                    "INSERT INTO messages (id, channel_id, author_id, body, created_at) VALUES (?1, 'c1', ?2, ?3, ?4)",
                    params![format!("m{}", i), author.id, format!("hello {}", i), ts],
                )?;
            }
            Ok(())
        })
        .unwrap();

        let page = db.get_messages("c1", 2, None).unwrap();
        assert_eq!(page.iter().map(|m| m.created_at).collect::<Vec<_>>(), vec![300, 200]);
        assert_eq!(page[0].author_username, "alice");

        let older = db.get_messages("c1", 10, Some(200)).unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].body, "hello 0");
    }

    #[test]
    fn test_insert_and_bounded_scan() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            db.insert_message("c1", "ghost", &format!("m{}", i)).unwrap();
        }
        db.insert_message("c2", "ghost", "other").unwrap();

        let ids = db.with_conn(|conn| message_ids_in_channel(conn, "c1", 3)).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(db.get_messages("c1", 50, None).unwrap()[0].author_username, "unknown");
    }

    #[test]
    fn test_server_scan_reaches_every_channel() {
        let db = Database::open_in_memory().unwrap();
        let server = db.create_server("owner", "Lounge").unwrap();
        let quiet = db.create_channel(&server.id, "owner", "quiet").unwrap().into_inner();
        let busy = db.create_channel(&server.id, "owner", "busy").unwrap().into_inner();
        for i in 0..4 {
            db.insert_message(&busy.id, "owner", &format!("m{}", i)).unwrap();
        }
        db.insert_message("elsewhere", "owner", "stray").unwrap();

        let ids = db.with_conn(|conn| message_ids_in_server(conn, &server.id, 3)).unwrap();
        assert_eq!(ids.len(), 3);
        let all = db.with_conn(|conn| message_ids_in_server(conn, &server.id, 100)).unwrap();
        assert_eq!(all.len(), 4);
        assert!(db.get_messages(&quiet.id, 10, None).unwrap().is_empty());
    }
}
