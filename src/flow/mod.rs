//! Setup wizard
//!
//! - `config_flow`: the per-attempt state machine (user → device → entry)
//! - `manager`: in-progress flows keyed by flow id

pub mod config_flow;
pub mod manager;

pub use config_flow::ConfigFlow;
pub use manager::{FlowManager, FlowResponse};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::models::EntryDraft;

/// Lookup of already configured devices, used to refuse duplicates
#[async_trait]
pub trait ConfiguredEntries: Send + Sync {
    async fn is_configured(&self, unique_id: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    User,
    Device,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Password,
    Port,
    Select,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    /// value → label, select fields only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<BTreeMap<String, String>>,
}

impl FormField {
    pub fn new(name: &str, field_type: FieldType, required: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required,
            options: None,
        }
    }

    pub fn select(name: &str, options: BTreeMap<String, String>) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Select,
            required: true,
            options: Some(options),
        }
    }
}

/// Outcome of one flow step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    Form {
        step_id: FlowStep,
        fields: Vec<FormField>,
        /// field name (or "base") → error code
        errors: BTreeMap<String, String>,
        /// previously submitted values
        defaults: BTreeMap<String, String>,
    },
    CreateEntry(EntryDraft),
    Abort {
        reason: String,
    },
}

impl FlowResult {
    pub fn abort(reason: &str) -> Self {
        FlowResult::Abort {
            reason: reason.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlowResult::Form { .. })
    }
}

/// Submitted form values
pub type FlowInput = serde_json::Map<String, serde_json::Value>;
