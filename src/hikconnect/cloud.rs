//! Hik-Connect cloud API client

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{alarm_flag, status_error, AlarmApi};
use crate::config::HikConnectConfig;
use crate::error::ApiError;
use crate::models::{ApiKind, DeviceSummary, StatusSnapshot};

const LOGIN_PATH: &str = "/v3/users/login/v2";
const DEVICES_PATH: &str = "/api/v3/devices";
const ALARM_STATUS_PATH: &str = "/api/v3/alarm/device/status";

/// Lifetime assumed when the login response omits `expires_in`
const DEFAULT_EXPIRES_IN: u64 = 7200;

#[derive(Debug, Clone)]
pub struct CloudSettings {
    pub base_url: String,
    pub app_key: String,
    pub app_secret: String,
    pub expiry_buffer: Duration,
    pub request_timeout: Duration,
}

impl CloudSettings {
    pub fn from_config(config: &HikConnectConfig) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            app_key: config.app_key.clone(),
            app_secret: config.app_secret.clone(),
            expiry_buffer: config.token_expiry_buffer(),
            request_timeout: config.request_timeout(),
        }
    }
}

/// Bearer token with its (buffered) expiry
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    pub fn issued(value: String, expires_in: u64, buffer: Duration, now: Instant) -> Self {
        let lifetime = Duration::from_secs(expires_in).saturating_sub(buffer);
        Self {
            value,
            expires_at: now + lifetime,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    devices: Vec<CloudDevice>,
}

#[derive(Debug, Deserialize)]
struct CloudDevice {
    #[serde(rename = "deviceSerial")]
    device_serial: String,
    #[serde(rename = "deviceName", default)]
    device_name: Option<String>,
    #[serde(rename = "deviceModel", default)]
    device_model: Option<String>,
}

pub struct HikConnectCloud {
    settings: CloudSettings,
    username: String,
    password: String,
    token: RwLock<Option<AccessToken>>,
    http_client: Client,
}

impl HikConnectCloud {
    pub fn new(settings: CloudSettings, username: &str, password: &str) -> Result<Self, ApiError> {
        let base = url::Url::parse(&settings.base_url)
            .map_err(|e| ApiError::Unknown(format!("Invalid API base URL: {}", e)))?;

        let http_client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ApiError::Unknown(format!("HTTP client: {}", e)))?;

        Ok(Self {
            settings: CloudSettings {
                base_url: base.as_str().trim_end_matches('/').to_string(),
                ..settings
            },
            username: username.to_string(),
            password: password.to_string(),
            token: RwLock::new(None),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url, path)
    }

    async fn login(&self) -> Result<String, ApiError> {
        let form = [
            ("client_id", self.settings.app_key.as_str()),
            ("client_secret", self.settings.app_secret.as_str()),
            ("grant_type", "password"),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];

        let resp = self
            .http_client
            .post(self.url(LOGIN_PATH))
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!("[HikConnect] Login rejected with HTTP {}", status.as_u16());
            return Err(match status.as_u16() {
                400 | 401 | 403 => ApiError::InvalidAuth,
                _ => status_error(status, "Login"),
            });
        }

        let login: LoginResponse = resp.json().await?;
        let expires_in = login.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        let token = AccessToken::issued(
            login.access_token.clone(),
            expires_in,
            self.settings.expiry_buffer,
            Instant::now(),
        );

        {
            let mut slot = self.token.write().await;
            *slot = Some(token);
        }

        tracing::info!("[HikConnect] Token acquired, expires in {} sec", expires_in);
        Ok(login.access_token)
    }

    async fn ensure_token(&self) -> Result<String, ApiError> {
        {
            let token = self.token.read().await;
            if let Some(ref t) = *token {
                if !t.is_expired_at(Instant::now()) {
                    return Ok(t.value().to_string());
                }
            }
        }

        tracing::debug!("[HikConnect] Token missing or expired, logging in");
        self.login().await
    }

    async fn drop_token(&self) {
        let mut token = self.token.write().await;
        *token = None;
    }
}

#[async_trait]
impl AlarmApi for HikConnectCloud {
    async fn authenticate(&self) -> Result<(), ApiError> {
        self.login().await.map(|_| ())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceSummary>, ApiError> {
        let token = self.ensure_token().await?;

        let resp = self
            .http_client
            .get(self.url(DEVICES_PATH))
            .bearer_auth(&token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::CannotConnect(format!(
                "Device list returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: DevicesResponse = resp.json().await?;
        Ok(body
            .devices
            .into_iter()
            .map(|d| DeviceSummary {
                name: d.device_name.unwrap_or_else(|| d.device_serial.clone()),
                serial: d.device_serial,
                model: d.device_model,
            })
            .collect())
    }

    async fn get_status(&self, device_serial: &str) -> Result<StatusSnapshot, ApiError> {
        let token = self.ensure_token().await?;

        let resp = self
            .http_client
            .get(self.url(ALARM_STATUS_PATH))
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .query(&[("deviceSerial", device_serial)])
            .send()
            .await?;

        let status = resp.status();
        // A rejected token is never retried
        if matches!(status.as_u16(), 401 | 403) {
            self.drop_token().await;
        }
        if !status.is_success() {
            return Err(status_error(status, "Alarm status"));
        }

        let body: serde_json::Map<String, serde_json::Value> = resp.json().await?;
        Ok(snapshot_from_cloud(&body))
    }

    fn kind(&self) -> ApiKind {
        ApiKind::Cloud
    }
}

fn snapshot_from_cloud(body: &serde_json::Map<String, serde_json::Value>) -> StatusSnapshot {
    let non_null = |key: &str| body.get(key).filter(|v| !v.is_null()).cloned();

    StatusSnapshot {
        alarm_status: alarm_flag(body.get("alarmStatus")),
        alarm_type: match body.get("alarmType") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => "unknown".to_string(),
            Some(other) => other.to_string(),
        },
        alarm_time: non_null("alarmTime"),
        device_model: body
            .get("deviceModel")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        device_status: non_null("deviceStatus"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: &str) -> CloudSettings {
        CloudSettings {
            base_url: base_url.to_string(),
            app_key: "app-key".to_string(),
            app_secret: "app-secret".to_string(),
            expiry_buffer: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn client(server: &MockServer) -> HikConnectCloud {
        HikConnectCloud::new(settings(&server.uri()), "user@example.com", "pw").unwrap()
    }

    async fn mount_login(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("client_id=app-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-1",
                "expires_in": 3600
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn test_token_expires_at_buffered_lifetime() {
        let now = Instant::now();
        let token = AccessToken::issued("t".into(), 3600, Duration::from_secs(60), now);

        assert!(!token.is_expired_at(now));
        assert!(!token.is_expired_at(now + Duration::from_secs(3539)));
        assert!(token.is_expired_at(now + Duration::from_secs(3540)));
    }

    #[test]
    fn test_token_with_short_lifetime_is_immediately_expired() {
        let now = Instant::now();
        let token = AccessToken::issued("t".into(), 30, Duration::from_secs(60), now);
        assert!(token.is_expired_at(now));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = HikConnectCloud::new(settings("not a url"), "u", "p");
        assert!(matches!(result, Err(ApiError::Unknown(_))));
    }

    #[tokio::test]
    async fn test_login_unauthorized_is_invalid_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).authenticate().await.unwrap_err();
        assert_eq!(err, ApiError::InvalidAuth);
    }

    #[tokio::test]
    async fn test_login_server_error_is_cannot_connect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).authenticate().await.unwrap_err();
        assert!(matches!(err, ApiError::CannotConnect(_)));
    }

    #[tokio::test]
    async fn test_list_devices_uses_bearer_token() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(DEVICES_PATH))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "devices": [
                    {"deviceSerial": "Q1", "deviceName": "Garage", "deviceModel": "AX-PRO"},
                    {"deviceSerial": "Q2"}
                ]
            })))
            .mount(&server)
            .await;

        let api = client(&server);
        api.authenticate().await.unwrap();
        let devices = api.list_devices().await.unwrap();

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "Garage");
        assert_eq!(devices[0].model.as_deref(), Some("AX-PRO"));
        assert_eq!(devices[1].name, "Q2");
    }

    #[tokio::test]
    async fn test_status_reuses_cached_token() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(ALARM_STATUS_PATH))
            .and(query_param("deviceSerial", "Q1"))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "alarmStatus": true,
                "alarmType": "intrusion",
                "alarmTime": "2024-05-01T10:00:00Z",
                "deviceModel": "AX-PRO",
                "deviceStatus": "online"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let api = client(&server);
        let first = api.get_status("Q1").await.unwrap();
        let second = api.get_status("Q1").await.unwrap();

        assert!(first.alarm_status);
        assert_eq!(first.alarm_type, "intrusion");
        assert_eq!(first.alarm_time, Some(json!("2024-05-01T10:00:00Z")));
        assert_eq!(first.device_model.as_deref(), Some("AX-PRO"));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_status_missing_fields_use_defaults() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(ALARM_STATUS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let snapshot = client(&server).get_status("Q1").await.unwrap();
        assert!(!snapshot.alarm_status);
        assert_eq!(snapshot.alarm_type, "unknown");
        assert_eq!(snapshot.alarm_time, None);
        assert_eq!(snapshot.device_model, None);
        assert_eq!(snapshot.device_status, None);
    }

    #[tokio::test]
    async fn test_status_server_error_is_cannot_connect() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(ALARM_STATUS_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server).get_status("Q1").await.unwrap_err();
        assert!(matches!(err, ApiError::CannotConnect(_)));
    }

    #[tokio::test]
    async fn test_status_unauthorized_forces_new_login() {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        Mock::given(method("GET"))
            .and(path(ALARM_STATUS_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let api = client(&server);
        assert_eq!(api.get_status("Q1").await.unwrap_err(), ApiError::InvalidAuth);
        assert_eq!(api.get_status("Q1").await.unwrap_err(), ApiError::InvalidAuth);
    }

    #[tokio::test]
    async fn test_status_forbidden_forces_new_login() {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        Mock::given(method("GET"))
            .and(path(ALARM_STATUS_PATH))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let api = client(&server);
        assert_eq!(api.get_status("Q1").await.unwrap_err(), ApiError::InvalidAuth);
        assert_eq!(api.get_status("Q1").await.unwrap_err(), ApiError::InvalidAuth);
        assert!(api.token.read().await.is_none());
    }
}
