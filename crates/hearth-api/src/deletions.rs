use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use hearth_jobs::deletion::{get_status, request_deletion, snapshot};
use hearth_jobs::{DeletionError, DeletionTarget};
use hearth_types::api::DeletionStatusResponse;

use crate::auth::AppState;
use crate::blocking;
use crate::middleware::AuthUser;

async fn start(state: AppState, target: DeletionTarget, user_id: String) -> Result<Json<DeletionStatusResponse>, StatusCode> {
    let db = state.db.clone();
    let op = tokio::task::spawn_blocking(move || request_deletion(&db, &target, &user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| match e {
            DeletionError::Permission(_) => StatusCode::FORBIDDEN,
            DeletionError::NotFound(_) => StatusCode::NOT_FOUND,
            DeletionError::Store(e) => {
                error!("Deletion request failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    Ok(Json(snapshot(&op)))
}

/// `null` when the caller has no visible deletion for the target.
async fn status(state: AppState, target_id: String, user_id: String) -> Result<Json<Option<DeletionStatusResponse>>, StatusCode> {
    let op = blocking(&state, move |db| get_status(db, &target_id, &user_id)).await?;
    Ok(Json(op.as_ref().map(snapshot)))
}

pub async fn delete_server(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    start(state, DeletionTarget::Server { server_id }, auth.user_id).await
}

pub async fn server_deletion_status(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    status(state, server_id, auth.user_id).await
}

pub async fn delete_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    start(state, DeletionTarget::Channel { channel_id }, auth.user_id).await
}

pub async fn channel_deletion_status(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    status(state, channel_id, auth.user_id).await
}
