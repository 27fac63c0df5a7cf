//! Authorization preconditions for destructive calls. Both checks run on the
//! caller's connection so they see the same snapshot as the write that follows.

use rusqlite::Connection;

use hearth_db::models::{ChannelRow, ServerRow};
use hearth_db::queries::channels::query_channel;
use hearth_db::queries::servers::query_server;

use crate::error::{DeletionError, DeletionResult};

/// Only the server owner passes.
pub fn require_owner(conn: &Connection, server_id: &str, user_id: &str) -> DeletionResult<ServerRow> {
    let server = query_server(conn, server_id)?
        .ok_or_else(|| DeletionError::NotFound(format!("server {}", server_id)))?;

    if server.owner_id != user_id {
        return Err(DeletionError::Permission(format!(
            "user {} does not own server {}",
            user_id, server_id
        )));
    }
    Ok(server)
}

/// The owner of the channel's server or the channel's creator passes.
pub fn require_owner_or_creator(
    conn: &Connection,
    channel_id: &str,
    user_id: &str,
) -> DeletionResult<ChannelRow> {
    let channel = query_channel(conn, channel_id)?
        .ok_or_else(|| DeletionError::NotFound(format!("channel {}", channel_id)))?;

    if channel.creator_id == user_id {
        return Ok(channel);
    }

    let owns_server = query_server(conn, &channel.server_id)?.is_some_and(|s| s.owner_id == user_id);
    if !owns_server {
        return Err(DeletionError::Permission(format!(
            "user {} may not delete channel {}",
            user_id, channel_id
        )));
    }
    Ok(channel)
}
