use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use hearth_db::models::AuthAccountRow;
use hearth_db::{Database, InsertOutcome, now_ms};
use hearth_types::api::{
    IdentityResponse, LinkIdentityRequest, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
};

use crate::blocking;
use crate::middleware::AuthUser;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub session_ttl_ms: i64,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, session_ttl_days: i64) -> AppState {
        Arc::new(Self {
            db,
            session_ttl_ms: session_ttl_days * 24 * 60 * 60 * 1000,
        })
    }
}

/// Fixed-window rate limit: at most `max` calls per `window_ms`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limit {
    pub action: &'static str,
    pub max: u32,
    pub window_ms: i64,
}

const REGISTER_LIMIT: Limit = Limit { action: "register", max: 5, window_ms: 60 * 60 * 1000 };
const LOGIN_LIMIT: Limit = Limit { action: "login", max: 10, window_ms: 15 * 60 * 1000 };

/// Count one attempt against `limit` for `key`; `429` once the window is spent.
pub(crate) async fn check_rate_limit(state: &AppState, limit: Limit, key: String) -> Result<(), StatusCode> {
    let decision = blocking(state, move |db| {
        db.consume_rate_limit(limit.action, &key, limit.max, limit.window_ms, now_ms())
    })
    .await?;

    if !decision.allowed {
        warn!("Rate limit hit for {} (retry in {}ms)", limit.action, decision.retry_after_ms);
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(())
}

/// Sessions are keyed by the SHA-256 of the bearer token; the token itself
/// is never stored.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

async fn issue_session(state: &AppState, user_id: String) -> Result<String, StatusCode> {
    let token = generate_token();
    let token_hash = hash_token(&token);
    let expires_at = now_ms() + state.session_ttl_ms;
    blocking(state, move |db| db.create_session(&user_id, &token_hash, expires_at)).await?;
    Ok(token)
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Validate input
    let username = req.username.trim().to_string();
    if username.len() < 3 || username.len() > 32 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }

    check_rate_limit(&state, REGISTER_LIMIT, username.to_lowercase()).await?;

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .to_string();

    let name = username.clone();
    let user = match blocking(&state, move |db| db.create_user(&name, &password_hash)).await? {
        InsertOutcome::Created(user) => user,
        InsertOutcome::Existing(_) => return Err(StatusCode::CONFLICT),
    };

    let token = issue_session(&state, user.id.clone()).await?;
    info!("Registered user {} ({})", user.username, user.id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    check_rate_limit(&state, LOGIN_LIMIT, req.username.trim().to_lowercase()).await?;

    let username = req.username.clone();
    let user = blocking(&state, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let token = issue_session(&state, user.id.clone()).await?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        token,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    blocking(&state, move |db| db.delete_sessions(&auth.token_hash)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn identity_response(account: AuthAccountRow) -> IdentityResponse {
    IdentityResponse {
        id: account.id,
        provider: account.provider,
        subject: account.provider_account_id,
        last_used_at: account.last_used_at,
    }
}

/// Link an external identity to the caller. Relinking refreshes the link;
/// an identity owned by someone else is a conflict.
pub async fn link_identity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<LinkIdentityRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let provider = req.provider.trim().to_lowercase();
    let subject = req.subject.trim().to_string();
    if provider.is_empty() || subject.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user_id = auth.user_id.clone();
    let outcome = blocking(&state, move |db| db.link_provider_account(&user_id, &provider, &subject, now_ms())).await?;

    let status = if outcome.is_created() { StatusCode::CREATED } else { StatusCode::OK };
    let account = outcome.into_inner();
    if account.user_id != auth.user_id {
        return Err(StatusCode::CONFLICT);
    }

    Ok((status, Json(identity_response(account))))
}

/// The caller's link for `(provider, subject)`. A link owned by someone else
/// is reported as missing.
pub async fn get_identity(
    State(state): State<AppState>,
    Path((provider, subject)): Path<(String, String)>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let provider = provider.trim().to_lowercase();
    let account = blocking(&state, move |db| db.get_provider_account(&provider, subject.trim()))
        .await?
        .filter(|account| account.user_id == auth.user_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(identity_response(account)))
}
