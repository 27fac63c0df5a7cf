use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{deletions, friends, messages, servers};

/// Every HTTP route. Layers that belong to the process (CORS, tracing) are
/// added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/identities", post(auth::link_identity))
        .route("/auth/identities/{provider}/{subject}", get(auth::get_identity))
        .route("/servers", post(servers::create_server))
        .route("/servers/{server_id}", get(servers::get_server))
        .route("/servers/{server_id}/join", post(servers::join_server))
        .route(
            "/servers/{server_id}/channels",
            get(servers::list_channels).post(servers::create_channel),
        )
        .route("/servers/{server_id}/channels/{name}", get(servers::get_channel_by_name))
        .route(
            "/servers/{server_id}/deletion",
            post(deletions::delete_server).get(deletions::server_deletion_status),
        )
        .route(
            "/channels/{channel_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/channels/{channel_id}/deletion",
            post(deletions::delete_channel).get(deletions::channel_deletion_status),
        )
        .route("/friends", get(friends::list_friends))
        .route(
            "/friends/{user_id}",
            get(friends::get_friend)
                .put(friends::add_friend)
                .delete(friends::remove_friend),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
