//! Router configuration for the signal relay API

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::AppState;

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        // Session metadata
        .route("/api/session", post(handlers::create_session))
        .route(
            "/api/session/{id}",
            get(handlers::get_session).patch(handlers::update_session),
        )
        // Signaling relay
        .route(
            "/api/session/{id}/signal",
            post(handlers::post_signal).get(handlers::get_signals),
        )
        .with_state(state)
}
