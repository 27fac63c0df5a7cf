use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use hearth_db::models::MessageRow;
use hearth_types::api::{MessageResponse, SendMessageRequest};

use crate::auth::{AppState, Limit, check_rate_limit};
use crate::blocking;
use crate::middleware::AuthUser;

const SEND_LIMIT: Limit = Limit { action: "send_message", max: 30, window_ms: 10 * 1000 };
const MAX_BODY_LEN: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: the `created_at` of the oldest message on the previous page.
    pub before: Option<i64>,
}

fn default_limit() -> u32 {
    50
}

fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id,
        channel_id: row.channel_id,
        author_id: row.author_id,
        author_username: row.author_username,
        body: row.body,
        created_at: row.created_at,
    }
}

/// Members and the owner of the channel's server may read and post.
async fn require_channel_access(state: &AppState, channel_id: String, user_id: String) -> Result<(), StatusCode> {
    let access = blocking(state, move |db| {
        let Some(channel) = db.get_channel(&channel_id)? else {
            return Ok(None);
        };
        Ok(Some(db.is_member(&channel.server_id, &user_id)?))
    })
    .await?;

    match access {
        None => Err(StatusCode::NOT_FOUND),
        Some(false) => Err(StatusCode::FORBIDDEN),
        Some(true) => Ok(()),
    }
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.body.trim().is_empty() || req.body.len() > MAX_BODY_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    require_channel_access(&state, channel_id.clone(), auth.user_id.clone()).await?;
    check_rate_limit(&state, SEND_LIMIT, auth.user_id.clone()).await?;

    let author = auth.user_id.clone();
    let message = blocking(&state, move |db| db.insert_message(&channel_id, &author, &req.body)).await?;

    Ok((StatusCode::CREATED, Json(message_response(message))))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(query): Query<MessageQuery>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    require_channel_access(&state, channel_id.clone(), auth.user_id).await?;

    let limit = query.limit.min(200);
    let rows = blocking(&state, move |db| db.get_messages(&channel_id, limit, query.before)).await?;

    Ok(Json(rows.into_iter().map(message_response).collect::<Vec<_>>()))
}
