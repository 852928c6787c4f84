//! Alarm binary sensor entity

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::coordinator::AlarmCoordinator;
use crate::error::ApiError;
use crate::hikconnect::{DEFAULT_NAME, DOMAIN, MANUFACTURER};
use crate::models::ConfigEntry;

pub const ATTR_ALARM_TYPE: &str = "alarm_type";
pub const ATTR_ALARM_TIME: &str = "alarm_time";
pub const ATTR_DEVICE_MODEL: &str = "device_model";
pub const ATTR_DEVICE_STATUS: &str = "device_status";

pub const DEVICE_CLASS_SAFETY: &str = "safety";

/// Groups entities under one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
}

/// Rendered entity state as written to the entity table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub entity_id: String,
    pub unique_id: String,
    pub entry_id: String,
    pub name: String,
    /// "on", "off" or "unavailable"
    pub state: String,
    pub is_on: bool,
    pub available: bool,
    pub device_class: &'static str,
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub device: DeviceInfo,
    pub last_updated: Option<DateTime<Utc>>,
}

pub struct AlarmBinarySensor {
    coordinator: Arc<AlarmCoordinator>,
    entry_id: String,
    unique_id: String,
    name: String,
    device_info: DeviceInfo,
}

impl AlarmBinarySensor {
    pub fn new(coordinator: Arc<AlarmCoordinator>, entry: &ConfigEntry) -> Self {
        let serial = coordinator.device_serial().to_string();
        let name = entry
            .data
            .device_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NAME.to_string());

        Self {
            coordinator,
            entry_id: entry.entry_id.clone(),
            unique_id: format!("hikconnect_{}", serial),
            device_info: DeviceInfo {
                identifiers: vec![(DOMAIN.to_string(), serial)],
                name: name.clone(),
                manufacturer: MANUFACTURER.to_string(),
            },
            name,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn entity_id(&self) -> String {
        format!("binary_sensor.{}", slugify(&self.name))
    }

    /// True while the device reports an active alarm
    pub async fn is_on(&self) -> bool {
        self.coordinator
            .data()
            .await
            .map(|d| d.alarm_status)
            .unwrap_or(false)
    }

    pub async fn available(&self) -> bool {
        self.coordinator.last_update_success().await
    }

    pub async fn extra_state_attributes(&self) -> BTreeMap<String, serde_json::Value> {
        let mut attrs = BTreeMap::new();
        let Some(data) = self.coordinator.data().await else {
            return attrs;
        };

        let or_null = |v: Option<serde_json::Value>| v.unwrap_or(serde_json::Value::Null);
        attrs.insert(ATTR_ALARM_TYPE.to_string(), serde_json::Value::String(data.alarm_type));
        attrs.insert(ATTR_ALARM_TIME.to_string(), or_null(data.alarm_time));
        attrs.insert(
            ATTR_DEVICE_MODEL.to_string(),
            or_null(data.device_model.map(serde_json::Value::String)),
        );
        attrs.insert(ATTR_DEVICE_STATUS.to_string(), or_null(data.device_status));
        attrs
    }

    /// Entity `update` hook: ask the coordinator for a refresh
    pub async fn update(&self) -> Result<(), ApiError> {
        self.coordinator.request_refresh().await
    }

    pub async fn state(&self) -> EntityState {
        let is_on = self.is_on().await;
        let available = self.available().await;
        let state = match (available, is_on) {
            (false, _) => "unavailable",
            (true, true) => "on",
            (true, false) => "off",
        };

        EntityState {
            entity_id: self.entity_id(),
            unique_id: self.unique_id.clone(),
            entry_id: self.entry_id.clone(),
            name: self.name.clone(),
            state: state.to_string(),
            is_on,
            available,
            device_class: DEVICE_CLASS_SAFETY,
            attributes: self.extra_state_attributes().await,
            device: self.device_info.clone(),
            last_updated: self.coordinator.last_updated().await,
        }
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}
