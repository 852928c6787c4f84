//! Setup flow handlers
//!
//! - POST   /api/flows          - Start a flow, returns the first form
//! - POST   /api/flows/:flow_id - Submit the current step
//! - DELETE /api/flows/:flow_id - Abandon a flow

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use super::SuccessResponse;
use crate::error::AppError;
use crate::flow::{FlowInput, FlowResponse, FlowResult};
use crate::models::ApiKind;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StartFlowRequest {
    #[serde(default = "default_kind")]
    pub kind: ApiKind,
}

fn default_kind() -> ApiKind {
    ApiKind::Cloud
}

/// POST /api/flows
pub async fn start_flow(
    State(state): State<AppState>,
    Json(req): Json<StartFlowRequest>,
) -> Json<FlowResponse> {
    Json(state.flows.start(req.kind).await)
}

/// POST /api/flows/:flow_id
/// A finished flow is stored as a new entry and set up right away
pub async fn submit_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    Json(input): Json<FlowInput>,
) -> Result<Json<serde_json::Value>, AppError> {
    let response = state.flows.submit(&flow_id, input).await?;

    let FlowResult::CreateEntry(draft) = response.result else {
        return Ok(Json(serde_json::to_value(&response)?));
    };

    match state.entries.create_entry(draft).await {
        Ok(entry) => Ok(Json(serde_json::json!({
            "flow_id": flow_id,
            "type": "create_entry",
            "entry": entry,
        }))),
        // Lost a race against another flow for the same device
        Err(AppError::Conflict(_)) => Ok(Json(serde_json::json!({
            "flow_id": flow_id,
            "type": "abort",
            "reason": "already_configured",
        }))),
        Err(e) => Err(e),
    }
}

/// DELETE /api/flows/:flow_id
pub async fn abort_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.flows.abort(&flow_id).await?;
    Ok(Json(SuccessResponse::with_id("Flow aborted", flow_id)))
}
