//! REST surface over [`ChatServices`].

pub mod auth;
pub mod error;
pub mod friends;
pub mod messages;
pub mod middleware;
pub mod users;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use courier_core::ChatServices;

pub use error::ApiError;

/// Handlers share the services directly; every field is cheap to clone.
pub type AppState = ChatServices;

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/users/me", get(users::me))
        .route("/users/search", get(users::search))
        .route("/friends", get(friends::list_friends))
        .route("/friends/requests", get(friends::list_pending))
        .route("/friends/requests", post(friends::request_friendship))
        .route("/friends/requests/{request_id}/respond", post(friends::respond))
        .route("/messages", post(messages::send_message))
        .route("/messages/{message_id}/read", post(messages::mark_read))
        .route("/messages/{message_id}/delivered", post(messages::mark_delivered))
        .route("/conversations/{partner_id}", get(messages::get_conversation))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> &'static str {
    "ok"
}
