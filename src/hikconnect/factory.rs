//! Builds vendor adapters from configuration entries

use std::sync::Arc;

use super::cloud::{CloudSettings, HikConnectCloud};
use super::local::HikvisionDevice;
use super::AlarmApi;
use crate::config::HikConnectConfig;
use crate::error::ApiError;
use crate::models::{ApiKind, EntryData};

/// Seam between the wizard/lifecycle code and the concrete vendor clients
pub trait ApiFactory: Send + Sync {
    fn create(&self, data: &EntryData) -> Result<Arc<dyn AlarmApi>, ApiError>;
}

pub struct HikConnectFactory {
    config: HikConnectConfig,
}

impl HikConnectFactory {
    pub fn new(config: HikConnectConfig) -> Self {
        Self { config }
    }
}

impl ApiFactory for HikConnectFactory {
    fn create(&self, data: &EntryData) -> Result<Arc<dyn AlarmApi>, ApiError> {
        validate(data)?;

        match data.kind {
            ApiKind::Cloud => {
                let mut settings = CloudSettings::from_config(&self.config);
                if let Some(host) = non_empty(data.host.as_deref()) {
                    settings.base_url = host.to_string();
                }
                let client = HikConnectCloud::new(settings, &data.username, &data.password)?;
                Ok(Arc::new(client))
            }
            ApiKind::Local => {
                let host = non_empty(data.host.as_deref())
                    .ok_or_else(|| ApiError::Unknown("Host is required".to_string()))?;
                let device = HikvisionDevice::new(
                    host,
                    data.port.unwrap_or(self.config.local_port),
                    &data.username,
                    &data.password,
                    self.config.request_timeout(),
                )?;
                Ok(Arc::new(device))
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Connection parameters must be non-empty strings and a usable port
pub fn validate(data: &EntryData) -> Result<(), ApiError> {
    if data.username.trim().is_empty() {
        return Err(ApiError::Unknown("Username must not be empty".to_string()));
    }
    if data.password.is_empty() {
        return Err(ApiError::Unknown("Password must not be empty".to_string()));
    }
    if data.port == Some(0) {
        return Err(ApiError::Unknown("Port must be between 1 and 65535".to_string()));
    }
    if data.kind == ApiKind::Local && non_empty(data.host.as_deref()).is_none() {
        return Err(ApiError::Unknown("Host is required".to_string()));
    }
    Ok(())
}
