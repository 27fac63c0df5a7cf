use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};

use hearth_db::now_ms;

use crate::auth::{AppState, hash_token};
use crate::blocking;

/// The caller behind a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
    pub token_hash: String,
}

/// Resolve the bearer token to a live session and attach the user.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_hash = hash_token(token);
    let lookup = token_hash.clone();
    let user = blocking(&state, move |db| {
        let Some(session) = db.get_session(&lookup, now_ms())? else {
            return Ok(None);
        };
        db.get_user_by_id(&session.user_id)
    })
    .await?
    .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(AuthUser {
        user_id: user.id,
        username: user.username,
        token_hash,
    });
    Ok(next.run(req).await)
}
