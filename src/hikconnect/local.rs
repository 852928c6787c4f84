//! Hikvision device on the local network (ISAPI over HTTP basic auth)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{alarm_flag, status_error, AlarmApi};
use crate::error::ApiError;
use crate::models::{ApiKind, DeviceSummary, StatusSnapshot};

const DEVICE_INFO_PATH: &str = "/ISAPI/System/deviceInfo?format=json";
const ALARM_STATUS_PATH: &str = "/ISAPI/SecurityCP/status/host?format=json";

#[derive(Debug, Clone, Deserialize)]
pub struct LocalDeviceInfo {
    #[serde(rename = "deviceName", default)]
    pub device_name: Option<String>,
    #[serde(rename = "serialNumber")]
    pub serial_number: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(rename = "firmwareVersion", default)]
    pub firmware_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceInfoEnvelope {
    #[serde(rename = "DeviceInfo")]
    device_info: LocalDeviceInfo,
}

pub struct HikvisionDevice {
    base_url: String,
    username: String,
    password: String,
    info: RwLock<Option<LocalDeviceInfo>>,
    http_client: Client,
}

impl HikvisionDevice {
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else if host.contains(':') && !host.starts_with('[') {
            // Bare IPv6 literal
            format!("http://[{}]:{}", host, port)
        } else {
            format!("http://{}:{}", host, port)
        };
        url::Url::parse(&base)
            .map_err(|e| ApiError::Unknown(format!("Invalid device address {}: {}", base, e)))?;

        let http_client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true) // Devices ship self-signed certs
            .build()
            .map_err(|e| ApiError::Unknown(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base,
            username: username.to_string(),
            password: password.to_string(),
            info: RwLock::new(None),
            http_client,
        })
    }

    async fn get(&self, path: &str, context: &str) -> Result<reqwest::Response, ApiError> {
        let resp = self
            .http_client
            .get(format!("{}{}", self.base_url, path))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status, context));
        }
        Ok(resp)
    }

    pub async fn get_device_info(&self) -> Result<LocalDeviceInfo, ApiError> {
        let envelope: DeviceInfoEnvelope = self
            .get(DEVICE_INFO_PATH, "Device info")
            .await?
            .json()
            .await?;

        let info = envelope.device_info;
        tracing::debug!(
            "[Local] Device {} firmware {}",
            info.serial_number,
            info.firmware_version.as_deref().unwrap_or("unknown")
        );
        {
            let mut cached = self.info.write().await;
            *cached = Some(info.clone());
        }
        Ok(info)
    }

    pub async fn get_alarm_status(&self) -> Result<StatusSnapshot, ApiError> {
        let body: serde_json::Value = self
            .get(ALARM_STATUS_PATH, "Alarm status")
            .await?
            .json()
            .await?;

        // Firmware wraps the payload in HostStatus; older builds return it bare
        let status = body.get("HostStatus").unwrap_or(&body);
        let field = |key: &str| status.get(key).filter(|v| !v.is_null()).cloned();

        let cached_model = self.info.read().await.as_ref().and_then(|i| i.model.clone());

        Ok(StatusSnapshot {
            alarm_status: alarm_flag(status.get("alarmStatus").or_else(|| status.get("alarm"))),
            alarm_type: status
                .get("alarmType")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            alarm_time: field("alarmTime"),
            device_model: status
                .get("deviceModel")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or(cached_model),
            device_status: field("deviceStatus").or_else(|| field("status")),
        })
    }
}

#[async_trait]
impl AlarmApi for HikvisionDevice {
    async fn authenticate(&self) -> Result<(), ApiError> {
        self.get_device_info().await.map(|_| ())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceSummary>, ApiError> {
        let cached = self.info.read().await.clone();
        let info = match cached {
            Some(info) => info,
            None => self.get_device_info().await?,
        };

        Ok(vec![DeviceSummary {
            name: info
                .device_name
                .clone()
                .unwrap_or_else(|| info.serial_number.clone()),
            serial: info.serial_number,
            model: info.model,
        }])
    }

    async fn get_status(&self, device_serial: &str) -> Result<StatusSnapshot, ApiError> {
        tracing::trace!("[Hikvision] Fetching alarm status for {}", device_serial);
        self.get_alarm_status().await
    }

    fn kind(&self) -> ApiKind {
        ApiKind::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn device(server: &MockServer) -> HikvisionDevice {
        HikvisionDevice::new(&server.uri(), 80, "admin", "pw", Duration::from_secs(5)).unwrap()
    }

    async fn mount_device_info(server: &MockServer, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/ISAPI/System/deviceInfo"))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "DeviceInfo": {
                    "deviceName": "Hallway panel",
                    "serialNumber": "DS-123",
                    "model": "DS-PWA64",
                    "firmwareVersion": "V1.2.5"
                }
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn test_base_url_from_host_and_port() {
        let dev = HikvisionDevice::new("192.168.1.64", 8080, "a", "b", Duration::from_secs(1)).unwrap();
        assert_eq!(dev.base_url, "http://192.168.1.64:8080");
    }

    #[test]
    fn test_ipv6_host_is_bracketed() {
        let dev = HikvisionDevice::new("fd00::64", 80, "a", "b", Duration::from_secs(1)).unwrap();
        assert_eq!(dev.base_url, "http://[fd00::64]:80");

        let dev = HikvisionDevice::new("[fd00::64]", 8080, "a", "b", Duration::from_secs(1)).unwrap();
        assert_eq!(dev.base_url, "http://[fd00::64]:8080");
    }

    #[tokio::test]
    async fn test_authenticate_then_list_uses_cached_info() {
        let server = MockServer::start().await;
        mount_device_info(&server, 1).await;

        let dev = device(&server);
        dev.authenticate().await.unwrap();
        let devices = dev.list_devices().await.unwrap();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].serial, "DS-123");
        assert_eq!(devices[0].name, "Hallway panel");
    }

    #[tokio::test]
    async fn test_unauthorized_is_invalid_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ISAPI/System/deviceInfo"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert_eq!(device(&server).authenticate().await.unwrap_err(), ApiError::InvalidAuth);
    }

    #[tokio::test]
    async fn test_wrapped_status_payload() {
        let server = MockServer::start().await;
        mount_device_info(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/ISAPI/SecurityCP/status/host"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "HostStatus": {"alarm": 1, "alarmType": "zone", "status": "armed"}
            })))
            .mount(&server)
            .await;

        let dev = device(&server);
        dev.authenticate().await.unwrap();
        let snapshot = dev.get_status("DS-123").await.unwrap();

        assert!(snapshot.alarm_status);
        assert_eq!(snapshot.alarm_type, "zone");
        assert_eq!(snapshot.device_status, Some(json!("armed")));
        assert_eq!(snapshot.device_model.as_deref(), Some("DS-PWA64"));
    }

    #[tokio::test]
    async fn test_status_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ISAPI/SecurityCP/status/host"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = device(&server).get_status("DS-123").await.unwrap_err();
        assert!(matches!(err, ApiError::CannotConnect(_)));
    }
}
