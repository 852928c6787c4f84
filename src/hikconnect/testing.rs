//! Scripted vendor adapter for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{AlarmApi, ApiFactory};
use crate::error::ApiError;
use crate::models::{ApiKind, DeviceSummary, EntryData, StatusSnapshot};

pub struct FakeApi {
    kind: ApiKind,
    auth: Mutex<Result<(), ApiError>>,
    devices: Mutex<Result<Vec<DeviceSummary>, ApiError>>,
    statuses: Mutex<VecDeque<Result<StatusSnapshot, ApiError>>>,
    status_delay: Mutex<Duration>,
    pub auth_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new(kind: ApiKind) -> Self {
        Self {
            kind,
            auth: Mutex::new(Ok(())),
            devices: Mutex::new(Ok(Vec::new())),
            statuses: Mutex::new(VecDeque::new()),
            status_delay: Mutex::new(Duration::ZERO),
            auth_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_auth(self, result: Result<(), ApiError>) -> Self {
        *self.auth.lock().unwrap() = result;
        self
    }

    pub fn with_devices(self, devices: Vec<DeviceSummary>) -> Self {
        *self.devices.lock().unwrap() = Ok(devices);
        self
    }

    pub fn with_device_error(self, err: ApiError) -> Self {
        *self.devices.lock().unwrap() = Err(err);
        self
    }

    /// Queue the next status result; the last queued one repeats
    pub fn push_status(&self, result: Result<StatusSnapshot, ApiError>) {
        self.statuses.lock().unwrap().push_back(result);
    }

    /// Make every status call take this long
    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl AlarmApi for FakeApi {
    async fn authenticate(&self) -> Result<(), ApiError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        self.auth.lock().unwrap().clone()
    }

    async fn list_devices(&self) -> Result<Vec<DeviceSummary>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.devices.lock().unwrap().clone()
    }

    async fn get_status(&self, _device_serial: &str) -> Result<StatusSnapshot, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut queue = self.statuses.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(ApiError::CannotConnect("no status scripted".into())))
        }
    }

    fn kind(&self) -> ApiKind {
        self.kind
    }
}

/// Hands out the same fake for every entry
pub struct FakeFactory {
    pub api: Arc<FakeApi>,
}

impl ApiFactory for FakeFactory {
    fn create(&self, data: &EntryData) -> Result<Arc<dyn AlarmApi>, ApiError> {
        super::factory::validate(data)?;
        Ok(self.api.clone())
    }
}

pub fn snapshot(alarm: bool) -> StatusSnapshot {
    StatusSnapshot {
        alarm_status: alarm,
        alarm_type: if alarm { "intrusion" } else { "none" }.to_string(),
        alarm_time: Some(serde_json::json!("2024-05-01T10:00:00Z")),
        device_model: Some("AX-PRO".to_string()),
        device_status: Some(serde_json::json!("online")),
    }
}

pub fn device(serial: &str, name: &str) -> DeviceSummary {
    DeviceSummary {
        serial: serial.to_string(),
        name: name.to_string(),
        model: None,
    }
}
