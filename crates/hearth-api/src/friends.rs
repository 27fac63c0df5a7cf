use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use hearth_db::models::FriendshipRow;
use hearth_types::api::{FriendsResponse, FriendshipResponse};

use crate::auth::AppState;
use crate::blocking;
use crate::middleware::AuthUser;

fn friendship_response(row: FriendshipRow) -> FriendshipResponse {
    FriendshipResponse {
        id: row.id,
        user_ids: [row.user_low, row.user_high],
        created_at: row.created_at,
    }
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let friend_ids = blocking(&state, move |db| db.list_friends(&auth.user_id)).await?;
    Ok(Json(FriendsResponse { friend_ids }))
}

/// Befriend `user_id`. Repeating the call returns the existing friendship.
pub async fn add_friend(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    if user_id == auth.user_id {
        return Err(StatusCode::BAD_REQUEST);
    }

    let outcome = blocking(&state, move |db| {
        if db.get_user_by_id(&user_id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(db.create_friendship(&auth.user_id, &user_id)?))
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    let status = if outcome.is_created() { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(friendship_response(outcome.into_inner()))))
}

pub async fn get_friend(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = blocking(&state, move |db| db.get_friendship(&auth.user_id, &user_id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(friendship_response(row)))
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let removed = blocking(&state, move |db| db.delete_friendship(&auth.user_id, &user_id)).await?;
    Ok(if removed > 0 { StatusCode::NO_CONTENT } else { StatusCode::NOT_FOUND })
}
