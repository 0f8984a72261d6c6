use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

pub mod conversations;
use conversations::{create_conversation, get_conversation, list_conversations, mark_as_read};
pub mod messages;
use messages::{delete_message, get_message_history, send_message};
pub mod reactions;
use reactions::{add_like, remove_like};

use crate::websocket::handlers::ws_handler;

pub fn build_router(state: AppState) -> Router {
    // Service introspection endpoints (no API version prefix)
    let introspection = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(crate::metrics::metrics_handler));

    // API v1 endpoints (all business logic routes with /api/v1 prefix)
    let api_v1 = Router::new()
        // Conversations
        .route("/conversations", post(create_conversation))
        .route("/conversations", get(list_conversations))
        .route("/conversations/:id", get(get_conversation))
        .route("/conversations/:id/messages", post(send_message))
        .route("/conversations/:id/messages", get(get_message_history))
        .route("/conversations/:id/read", post(mark_as_read))
        // Message reactions and moderation
        .route("/messages/:id/likes", post(add_like))
        .route("/messages/:id/likes", delete(remove_like))
        .route("/messages/:id", delete(delete_message))
        // WebSocket endpoint (with API version prefix for consistency)
        .route("/ws", get(ws_handler));

    // Apply auth middleware only to API v1 (introspection stays public for healthchecks)
    let secured_api_v1 = api_v1.layer(middleware::from_fn_with_state(
        state.clone(),
        crate::middleware::auth::auth_middleware,
    ));

    // Combine introspection and API v1 routes
    let router = introspection
        .merge(Router::new().nest("/api/v1", secured_api_v1))
        .layer(middleware::from_fn(crate::metrics::track_http_metrics));

    crate::middleware::with_defaults(router).with_state(state)
}
