// rest/mod.rs: Public HTTP API.
//
// Endpoints:
//   GET  /                        (root container greeting)
//   GET  /api/v1/health
//   POST /api/v1/chat
//   POST /api/v1/quiz
//   POST /api/v1/feedback
//   GET  /api/v1/chats
//   GET  /api/v1/chats/{id}/messages

pub mod auth;
pub mod extract;
pub mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::AppContext;

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // Root container + health (no auth)
        .route("/", get(routes::root::root))
        .route("/api/v1/health", get(routes::health::health))
        // Callable operations
        .route("/api/v1/chat", post(routes::chat::chat))
        .route("/api/v1/quiz", post(routes::quiz::generate_quiz))
        .route("/api/v1/feedback", post(routes::feedback::submit_feedback))
        // History reads
        .route("/api/v1/chats", get(routes::chats::list_chats))
        .route(
            "/api/v1/chats/{id}/messages",
            get(routes::chats::list_messages),
        )
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
