//! Data models for hikconnect-alarm

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration Entry Models
// ============================================================================

/// Which vendor adapter an entry talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    /// Hik-Connect cloud account (bearer token, device list)
    Cloud,
    /// Hikvision device reachable on the local network
    Local,
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKind::Cloud => write!(f, "cloud"),
            ApiKind::Local => write!(f, "local"),
        }
    }
}

/// Persisted entry fields, stored verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryData {
    pub kind: ApiKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

impl EntryData {
    /// Copy safe to hand out over the API
    pub fn redacted(&self) -> Self {
        Self {
            password: "**********".to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub title: String,
    /// Device serial; at most one entry per value
    pub unique_id: String,
    pub data: EntryData,
    pub created_at: DateTime<Utc>,
}

impl ConfigEntry {
    pub fn from_draft(draft: EntryDraft) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().simple().to_string(),
            title: draft.title,
            unique_id: draft.unique_id,
            data: draft.data,
            created_at: Utc::now(),
        }
    }
}

/// Entry produced by a finished setup flow, not yet stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryDraft {
    pub title: String,
    pub unique_id: String,
    pub data: EntryData,
}

/// Load state of a stored entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum EntryState {
    Loaded,
    NotLoaded,
    SetupError(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub entry_id: String,
    pub title: String,
    pub unique_id: String,
    pub data: EntryData,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: EntryState,
    /// Most recent poll failure of a loaded entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl EntrySummary {
    pub fn new(entry: &ConfigEntry, state: EntryState) -> Self {
        Self {
            entry_id: entry.entry_id.clone(),
            title: entry.title.clone(),
            unique_id: entry.unique_id.clone(),
            data: entry.data.redacted(),
            created_at: entry.created_at,
            state,
            last_error: None,
        }
    }
}

// ============================================================================
// Device / Status Models
// ============================================================================

/// One device as enumerated by a vendor adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub serial: String,
    pub name: String,
    pub model: Option<String>,
}

impl DeviceSummary {
    /// Label used in the device picker
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.serial)
    }
}

/// Result of one status fetch; replaces the previous one wholesale
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub alarm_status: bool,
    pub alarm_type: String,
    pub alarm_time: Option<serde_json::Value>,
    pub device_model: Option<String>,
    pub device_status: Option<serde_json::Value>,
}
