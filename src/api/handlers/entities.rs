//! Entity state handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::AppError;
use crate::sensor::EntityState;
use crate::state::AppState;

/// GET /api/entities
pub async fn list_entities(State(state): State<AppState>) -> Json<Vec<EntityState>> {
    Json(state.states.list().await)
}

/// GET /api/entities/:unique_id
pub async fn get_entity(
    State(state): State<AppState>,
    Path(unique_id): Path<String>,
) -> Result<Json<EntityState>, AppError> {
    state
        .states
        .get(&unique_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Entity {} not found", unique_id)))
}
