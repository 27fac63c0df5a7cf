use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use hearth_db::InsertOutcome;
use hearth_db::models::{ChannelRow, ServerRow};
use hearth_types::api::{ChannelResponse, CreateChannelRequest, CreateServerRequest, ServerResponse};

use crate::auth::AppState;
use crate::blocking;
use crate::middleware::AuthUser;

fn server_response(row: ServerRow) -> ServerResponse {
    ServerResponse {
        id: row.id,
        name: row.name,
        owner_id: row.owner_id,
        created_at: row.created_at,
    }
}

fn channel_response(row: ChannelRow) -> ChannelResponse {
    ChannelResponse {
        id: row.id,
        server_id: row.server_id,
        name: row.name,
        creator_id: row.creator_id,
        created_at: row.created_at,
    }
}

fn valid_name(name: &str) -> Option<String> {
    let name = name.trim();
    (!name.is_empty() && name.len() <= 64).then(|| name.to_string())
}

/// `404` for a missing server, `403` when the caller is neither owner nor member.
async fn require_member(state: &AppState, server_id: String, user_id: String) -> Result<ServerRow, StatusCode> {
    let (server, member) = blocking(state, move |db| {
        let server = db.get_server(&server_id)?;
        let member = db.is_member(&server_id, &user_id)?;
        Ok((server, member))
    })
    .await?;

    let server = server.ok_or(StatusCode::NOT_FOUND)?;
    if !member {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(server)
}

pub async fn create_server(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateServerRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = valid_name(&req.name).ok_or(StatusCode::BAD_REQUEST)?;

    let owner = auth.user_id.clone();
    let server = blocking(&state, move |db| db.create_server(&owner, &name)).await?;
    info!("{} created server {} ({})", auth.username, server.name, server.id);

    Ok((StatusCode::CREATED, Json(server_response(server))))
}

pub async fn get_server(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let server = require_member(&state, server_id, auth.user_id).await?;
    Ok(Json(server_response(server)))
}

/// Joining twice is a no-op.
pub async fn join_server(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let joined = blocking(&state, move |db| {
        if db.get_server(&server_id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(db.add_member(&server_id, &auth.user_id)?))
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(if joined { StatusCode::CREATED } else { StatusCode::OK })
}

pub async fn list_channels(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    require_member(&state, server_id.clone(), auth.user_id).await?;

    let channels = blocking(&state, move |db| db.list_channels(&server_id)).await?;
    Ok(Json(channels.into_iter().map(channel_response).collect::<Vec<_>>()))
}

/// Look a channel up by name, compared case- and whitespace-insensitively.
pub async fn get_channel_by_name(
    State(state): State<AppState>,
    Path((server_id, name)): Path<(String, String)>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    require_member(&state, server_id.clone(), auth.user_id).await?;

    let channel = blocking(&state, move |db| db.get_channel_by_name(&server_id, &name))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(channel_response(channel)))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = valid_name(&req.name).ok_or(StatusCode::BAD_REQUEST)?;
    require_member(&state, server_id.clone(), auth.user_id.clone()).await?;

    let creator = auth.user_id.clone();
    let channel = match blocking(&state, move |db| db.create_channel(&server_id, &creator, &name)).await? {
        InsertOutcome::Created(channel) => channel,
        InsertOutcome::Existing(_) => return Err(StatusCode::CONFLICT),
    };
    info!("{} created channel #{} ({})", auth.username, channel.name, channel.id);

    Ok((StatusCode::CREATED, Json(channel_response(channel))))
}
