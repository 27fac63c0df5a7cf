//! Database row types; each maps directly to one SQLite row.
//! Distinct from hearth-types API models to keep the DB layer independent.
//!
//! `seq` is SQLite's `rowid`: the store-assigned insertion sequence used as
//! the final tie-break between duplicate natural-key rows.

use hearth_types::models::{DeletionStatus, DeletionTargetKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: String,
    pub seq: i64,
    pub username: String,
    pub username_normalized: String,
    pub password: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub id: String,
    pub seq: i64,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthAccountRow {
    pub id: String,
    pub seq: i64,
    pub user_id: String,
    pub provider: String,
    pub provider_account_id: String,
    pub last_used_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRow {
    pub id: String,
    pub seq: i64,
    pub action: String,
    pub key: String,
    pub window_start: i64,
    pub count: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendshipRow {
    pub id: String,
    pub seq: i64,
    pub user_low: String,
    pub user_high: String,
    pub created_at: i64,
}

impl FriendshipRow {
    /// The participant that is not `user_id`.
    pub fn other(&self, user_id: &str) -> &str {
        if self.user_low == user_id { &self.user_high } else { &self.user_low }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRow {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRow {
    pub id: String,
    pub seq: i64,
    pub server_id: String,
    pub name: String,
    pub name_normalized: String,
    pub creator_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRow {
    pub id: String,
    pub server_id: String,
    pub user_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author_username: String,
    pub body: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOperationRow {
    pub id: String,
    pub target_kind: DeletionTargetKind,
    pub requester_id: String,
    pub server_id: String,
    pub channel_id: Option<String>,
    pub status: DeletionStatus,
    pub deleted_messages: i64,
    pub deleted_channels: i64,
    pub deleted_memberships: i64,
    pub deleted_servers: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

impl DeletionOperationRow {
    /// The id the operation is indexed under: the channel for channel
    /// targets, otherwise the server.
    pub fn target_id(&self) -> &str {
        match self.target_kind {
            DeletionTargetKind::Channel => self.channel_id.as_deref().unwrap_or(&self.server_id),
            DeletionTargetKind::Server => &self.server_id,
        }
    }

    pub fn total_deleted(&self) -> i64 {
        self.deleted_messages + self.deleted_channels + self.deleted_memberships + self.deleted_servers
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTaskRow {
    pub id: String,
    pub kind: String,
    pub payload: String,
    pub run_at: i64,
    pub attempts: i64,
    pub locked_until: Option<i64>,
    pub state: String,
    pub last_error: Option<String>,
    pub created_at: i64,
}
