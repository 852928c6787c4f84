//! FlowManager: in-progress setup flows

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::{ConfigFlow, ConfiguredEntries, FlowInput, FlowResult};
use crate::error::AppError;
use crate::hikconnect::ApiFactory;
use crate::models::ApiKind;

#[derive(Debug, Clone, Serialize)]
pub struct FlowResponse {
    pub flow_id: String,
    #[serde(flatten)]
    pub result: FlowResult,
}

/// Flows idle this long are dropped
const FLOW_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
/// Oldest flows are dropped beyond this many
const MAX_FLOWS: usize = 64;

struct ActiveFlow {
    flow: Arc<Mutex<ConfigFlow>>,
    last_active: Instant,
}

pub struct FlowManager {
    flows: RwLock<HashMap<String, ActiveFlow>>,
    factory: Arc<dyn ApiFactory>,
    configured: Arc<dyn ConfiguredEntries>,
}

impl FlowManager {
    pub fn new(factory: Arc<dyn ApiFactory>, configured: Arc<dyn ConfiguredEntries>) -> Self {
        Self {
            flows: RwLock::new(HashMap::new()),
            factory,
            configured,
        }
    }

    /// Start a flow and return its first form
    pub async fn start(&self, kind: ApiKind) -> FlowResponse {
        let flow_id = uuid::Uuid::new_v4().simple().to_string();
        let mut flow = ConfigFlow::new(kind, self.factory.clone(), self.configured.clone());
        let result = flow.handle(None).await;

        let mut flows = self.flows.write().await;
        prune(&mut flows);
        if flows.len() >= MAX_FLOWS {
            let oldest = flows
                .iter()
                .min_by_key(|(_, f)| f.last_active)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                flows.remove(&id);
                tracing::debug!("[Flow] Dropped oldest flow {}", id);
            }
        }
        flows.insert(
            flow_id.clone(),
            ActiveFlow {
                flow: Arc::new(Mutex::new(flow)),
                last_active: Instant::now(),
            },
        );

        tracing::debug!("[Flow] Started {} flow {}", kind, flow_id);
        FlowResponse { flow_id, result }
    }

    /// Submit input to the current step; finished flows are dropped
    pub async fn submit(&self, flow_id: &str, input: FlowInput) -> Result<FlowResponse, AppError> {
        let flow = {
            let mut flows = self.flows.write().await;
            prune(&mut flows);
            let active = flows
                .get_mut(flow_id)
                .ok_or_else(|| AppError::NotFound(format!("Flow {} not found", flow_id)))?;
            active.last_active = Instant::now();
            active.flow.clone()
        };

        let result = flow.lock().await.handle(Some(&input)).await;

        if result.is_terminal() {
            self.flows.write().await.remove(flow_id);
            tracing::debug!("[Flow] Flow {} finished", flow_id);
        } else if let Some(active) = self.flows.write().await.get_mut(flow_id) {
            active.last_active = Instant::now();
        }

        Ok(FlowResponse {
            flow_id: flow_id.to_string(),
            result,
        })
    }

    pub async fn abort(&self, flow_id: &str) -> Result<(), AppError> {
        self.flows
            .write()
            .await
            .remove(flow_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Flow {} not found", flow_id)))
    }

    pub async fn in_progress(&self) -> usize {
        let mut flows = self.flows.write().await;
        prune(&mut flows);
        flows.len()
    }
}

fn prune(flows: &mut HashMap<String, ActiveFlow>) {
    let before = flows.len();
    flows.retain(|_, f| f.last_active.elapsed() < FLOW_IDLE_TTL);
    if flows.len() < before {
        tracing::debug!("[Flow] Dropped {} idle flow(s)", before - flows.len());
    }
}
