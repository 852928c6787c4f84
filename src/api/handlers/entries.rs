//! Configuration entry handlers
//!
//! - GET    /api/entries             - List entries with load state
//! - GET    /api/entries/:id         - Get one entry
//! - DELETE /api/entries/:id         - Unload and remove an entry
//! - POST   /api/entries/:id/reload  - Unload and set up again
//! - POST   /api/entries/:id/refresh - Poll the device now

use axum::{
    extract::{Path, State},
    Json,
};

use super::SuccessResponse;
use crate::error::AppError;
use crate::models::EntrySummary;
use crate::state::AppState;

/// GET /api/entries
pub async fn list_entries(State(state): State<AppState>) -> Json<Vec<EntrySummary>> {
    Json(state.entries.list_entries().await)
}

/// GET /api/entries/:id
pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EntrySummary>, AppError> {
    state
        .entries
        .get_entry(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Entry {} not found", id)))
}

/// DELETE /api/entries/:id
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.entries.remove_entry(&id).await?;
    Ok(Json(SuccessResponse::with_id("Entry removed", id)))
}

/// POST /api/entries/:id/reload
pub async fn reload_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EntrySummary>, AppError> {
    // Setup errors are reported through the entry state
    if let Err(e) = state.entries.reload_entry(&id).await {
        if let AppError::NotFound(_) = e {
            return Err(e);
        }
        tracing::warn!("[Entry] Reload of entry {} failed: {}", id, e);
    }

    state
        .entries
        .get_entry(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Entry {} not found", id)))
}

/// POST /api/entries/:id/refresh
pub async fn refresh_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.entries.refresh_entry(&id).await?;
    Ok(Json(SuccessResponse::with_id("Entry refreshed", id)))
}
