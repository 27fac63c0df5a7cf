use serde::{Deserialize, Serialize};

use crate::models::{DeletionStatus, DeletionTargetKind};

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub username: String,
    pub token: String,
}

/// Links an external identity (e.g. an OAuth subject) to the calling account.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkIdentityRequest {
    pub provider: String,
    pub subject: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityResponse {
    pub id: String,
    pub provider: String,
    pub subject: String,
    pub last_used_at: i64,
}

// -- Servers & channels --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateServerRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerResponse {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub id: String,
    pub server_id: String,
    pub name: String,
    pub creator_id: String,
    pub created_at: i64,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author_username: String,
    pub body: String,
    pub created_at: i64,
}

// -- Friends --

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendshipResponse {
    pub id: String,
    pub user_ids: [String; 2],
    pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendsResponse {
    pub friend_ids: Vec<String>,
}

// -- Deletion --

/// Snapshot of a cascading deletion, returned by both the start call and
/// the status poll so clients can treat them interchangeably.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionStatusResponse {
    pub ok: bool,
    pub operation_id: String,
    pub target_kind: DeletionTargetKind,
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
