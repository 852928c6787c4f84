//! API module - HTTP handlers and routes

pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::health_check))
        // Setup flows
        .route("/api/flows", post(handlers::start_flow))
        .route("/api/flows/:flow_id", post(handlers::submit_flow))
        .route("/api/flows/:flow_id", delete(handlers::abort_flow))
        // Configuration entries
        .route("/api/entries", get(handlers::list_entries))
        .route("/api/entries/:id", get(handlers::get_entry))
        .route("/api/entries/:id", delete(handlers::delete_entry))
        .route("/api/entries/:id/reload", post(handlers::reload_entry))
        .route("/api/entries/:id/refresh", post(handlers::refresh_entry))
        // Entities
        .route("/api/entities", get(handlers::list_entities))
        .route("/api/entities/:unique_id", get(handlers::get_entity))
}
