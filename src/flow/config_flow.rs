//! ConfigFlow: one attempt at adding a device
//!
//! `user` collects credentials (plus host/port for local devices), then
//! authenticates and enumerates devices. Cloud accounts continue to the
//! `device` picker; a local device is finalized directly.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ConfiguredEntries, FieldType, FlowInput, FlowResult, FlowStep, FormField};
use crate::error::ApiError;
use crate::hikconnect::ApiFactory;
use crate::models::{ApiKind, DeviceSummary, EntryData, EntryDraft};

const CONF_HOST: &str = "host";
const CONF_USERNAME: &str = "username";
const CONF_PASSWORD: &str = "password";
const CONF_PORT: &str = "port";
const CONF_DEVICE_SERIAL: &str = "device_serial";

pub struct ConfigFlow {
    kind: ApiKind,
    factory: Arc<dyn ApiFactory>,
    configured: Arc<dyn ConfiguredEntries>,
    step: FlowStep,
    credentials: Option<EntryData>,
    devices: Vec<DeviceSummary>,
}

impl ConfigFlow {
    pub fn new(
        kind: ApiKind,
        factory: Arc<dyn ApiFactory>,
        configured: Arc<dyn ConfiguredEntries>,
    ) -> Self {
        Self {
            kind,
            factory,
            configured,
            step: FlowStep::User,
            credentials: None,
            devices: Vec::new(),
        }
    }

    /// Feed input to whichever step is current
    pub async fn handle(&mut self, input: Option<&FlowInput>) -> FlowResult {
        match self.step {
            FlowStep::User => self.step_user(input).await,
            FlowStep::Device => self.step_device(input).await,
        }
    }

    pub async fn step_user(&mut self, input: Option<&FlowInput>) -> FlowResult {
        self.step = FlowStep::User;

        let Some(input) = input else {
            return self.user_form(BTreeMap::new(), BTreeMap::new());
        };

        let defaults = echo(input);
        let data = match self.parse_user_input(input) {
            Ok(data) => data,
            Err(errors) => return self.user_form(errors, defaults),
        };

        let devices = match self.discover(&data).await {
            Ok(devices) => devices,
            Err(ApiError::NoDevices) => return FlowResult::abort("no_devices"),
            Err(e) => {
                if let ApiError::Unknown(ref msg) = e {
                    tracing::error!("[Flow] Unexpected error during setup: {}", msg);
                } else {
                    tracing::warn!("[Flow] Setup attempt failed: {}", e);
                }
                let mut errors = BTreeMap::new();
                errors.insert("base".to_string(), e.code().to_string());
                return self.user_form(errors, defaults);
            }
        };

        self.credentials = Some(data);
        self.devices = devices;

        match self.kind {
            ApiKind::Local => {
                let device = self.devices[0].clone();
                self.finalize(&device).await
            }
            ApiKind::Cloud => self.step_device(None).await,
        }
    }

    pub async fn step_device(&mut self, input: Option<&FlowInput>) -> FlowResult {
        self.step = FlowStep::Device;

        if self.devices.is_empty() {
            return FlowResult::abort("no_devices");
        }

        let Some(input) = input else {
            return self.device_form(BTreeMap::new());
        };

        let serial = text(input, CONF_DEVICE_SERIAL).unwrap_or_default();
        let Some(device) = self.devices.iter().find(|d| d.serial == serial).cloned() else {
            let mut errors = BTreeMap::new();
            errors.insert(CONF_DEVICE_SERIAL.to_string(), "invalid_device".to_string());
            return self.device_form(errors);
        };

        self.finalize(&device).await
    }

    /// Authenticate, then list devices: at most two calls, no retry
    async fn discover(&self, data: &EntryData) -> Result<Vec<DeviceSummary>, ApiError> {
        let api = self.factory.create(data)?;
        api.authenticate().await?;
        let devices = api.list_devices().await?;
        if devices.is_empty() {
            return Err(ApiError::NoDevices);
        }
        tracing::info!("[Flow] Authenticated, {} device(s) available", devices.len());
        Ok(devices)
    }

    async fn finalize(&self, device: &DeviceSummary) -> FlowResult {
        if self.configured.is_configured(&device.serial).await {
            tracing::info!("[Flow] Device {} is already configured", device.serial);
            return FlowResult::abort("already_configured");
        }

        let Some(credentials) = self.credentials.clone() else {
            return FlowResult::abort("unknown");
        };

        FlowResult::CreateEntry(EntryDraft {
            title: device.name.clone(),
            unique_id: device.serial.clone(),
            data: EntryData {
                device_serial: Some(device.serial.clone()),
                device_name: Some(device.name.clone()),
                ..credentials
            },
        })
    }

    fn parse_user_input(&self, input: &FlowInput) -> Result<EntryData, BTreeMap<String, String>> {
        let mut errors = BTreeMap::new();

        let host = text(input, CONF_HOST);
        let username = text(input, CONF_USERNAME);
        let password = text(input, CONF_PASSWORD);

        if username.is_none() {
            errors.insert(CONF_USERNAME.to_string(), "required".to_string());
        }
        if password.is_none() {
            errors.insert(CONF_PASSWORD.to_string(), "required".to_string());
        }
        if self.kind == ApiKind::Local && host.is_none() {
            errors.insert(CONF_HOST.to_string(), "required".to_string());
        }

        let port = match text(input, CONF_PORT) {
            None => None,
            Some(raw) => match raw.parse::<u16>() {
                Ok(p) if p > 0 => Some(p),
                _ => {
                    errors.insert(CONF_PORT.to_string(), "invalid_port".to_string());
                    None
                }
            },
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(EntryData {
            kind: self.kind,
            host,
            username: username.unwrap_or_default(),
            password: password.unwrap_or_default(),
            port,
            device_serial: None,
            device_name: None,
        })
    }

    fn user_form(
        &self,
        errors: BTreeMap<String, String>,
        defaults: BTreeMap<String, String>,
    ) -> FlowResult {
        let fields = match self.kind {
            ApiKind::Cloud => vec![
                FormField::new(CONF_USERNAME, FieldType::String, true),
                FormField::new(CONF_PASSWORD, FieldType::Password, true),
                FormField::new(CONF_HOST, FieldType::String, false),
            ],
            ApiKind::Local => vec![
                FormField::new(CONF_HOST, FieldType::String, true),
                FormField::new(CONF_USERNAME, FieldType::String, true),
                FormField::new(CONF_PASSWORD, FieldType::Password, true),
                FormField::new(CONF_PORT, FieldType::Port, false),
            ],
        };

        FlowResult::Form {
            step_id: FlowStep::User,
            fields,
            errors,
            defaults,
        }
    }

    fn device_form(&self, errors: BTreeMap<String, String>) -> FlowResult {
        let options = self
            .devices
            .iter()
            .map(|d| (d.serial.clone(), d.label()))
            .collect();

        FlowResult::Form {
            step_id: FlowStep::Device,
            fields: vec![FormField::select(CONF_DEVICE_SERIAL, options)],
            errors,
            defaults: BTreeMap::new(),
        }
    }
}

/// Non-empty trimmed string value; numbers are accepted as text
fn text(input: &FlowInput, key: &str) -> Option<String> {
    let value = match input.get(key)? {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}

fn echo(input: &FlowInput) -> BTreeMap<String, String> {
    input
        .iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::String(s) => Some((k.clone(), s.clone())),
            serde_json::Value::Number(n) => Some((k.clone(), n.to_string())),
            serde_json::Value::Bool(b) => Some((k.clone(), b.to_string())),
            _ => None,
        })
        .collect()
}
