pub mod auth;
pub mod deletions;
pub mod friends;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod servers;

use axum::http::StatusCode;
use tracing::error;

use hearth_db::Database;

pub use auth::{AppState, AppStateInner};
pub use routes::router;

/// Run a store call on the blocking pool. Store failures and join errors are
/// logged and collapse to `500`.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(db.as_ref()))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Store error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
