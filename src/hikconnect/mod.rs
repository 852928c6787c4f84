//! Hikvision vendor integration
//!
//! - `cloud`: Hik-Connect cloud API client (token management, device list, alarm status)
//! - `local`: Hikvision device on the local network (ISAPI)
//! - `factory`: builds the right adapter for a configuration entry
//!
//! The rest of the crate only talks to [`AlarmApi`].

pub mod cloud;
pub mod factory;
pub mod local;
#[cfg(test)]
pub mod testing;

pub use factory::{ApiFactory, HikConnectFactory};

use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::{ApiKind, DeviceSummary, StatusSnapshot};

pub const DOMAIN: &str = "hikconnect_alarm";
pub const MANUFACTURER: &str = "Hikvision";
pub const DEFAULT_NAME: &str = "Hik-Connect Alarm";

/// Capabilities every vendor adapter provides
#[async_trait]
pub trait AlarmApi: Send + Sync {
    /// Verify the credentials (and cache whatever session the vendor hands out)
    async fn authenticate(&self) -> Result<(), ApiError>;

    /// Devices reachable with these credentials
    async fn list_devices(&self) -> Result<Vec<DeviceSummary>, ApiError>;

    /// Fetch a fresh alarm status snapshot for one device
    async fn get_status(&self, device_serial: &str) -> Result<StatusSnapshot, ApiError>;

    fn kind(&self) -> ApiKind;
}

/// Interpret a vendor alarm flag: booleans, numbers (non-zero) and a few strings
pub(crate) fn alarm_flag(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Some(serde_json::Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "on" | "alarm" | "triggered"
        ),
        _ => false,
    }
}

/// Map a non-success status code to an error kind
pub(crate) fn status_error(status: reqwest::StatusCode, context: &str) -> ApiError {
    match status.as_u16() {
        401 | 403 => ApiError::InvalidAuth,
        _ => ApiError::CannotConnect(format!("{} returned HTTP {}", context, status.as_u16())),
    }
}
