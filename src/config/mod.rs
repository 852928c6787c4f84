//! Configuration module

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub hikconnect: HikConnectConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Vendor API settings shared by every configured entry
#[derive(Debug, Clone, Deserialize)]
pub struct HikConnectConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// OAuth client id of the official mobile app
    #[serde(default = "default_app_key")]
    pub app_key: String,
    #[serde(default = "default_app_secret")]
    pub app_secret: String,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Bounds token refresh + status fetch for one poll
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_token_expiry_buffer")]
    pub token_expiry_buffer_secs: u64,
    #[serde(default = "default_local_port")]
    pub local_port: u16,
}

impl Default for HikConnectConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            app_key: default_app_key(),
            app_secret: default_app_secret(),
            scan_interval_secs: default_scan_interval(),
            request_timeout_secs: default_request_timeout(),
            token_expiry_buffer_secs: default_token_expiry_buffer(),
            local_port: default_local_port(),
        }
    }
}

impl HikConnectConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn token_expiry_buffer(&self) -> Duration {
        Duration::from_secs(self.token_expiry_buffer_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_entries_path")]
    pub entries_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            entries_path: default_entries_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8123
}

fn default_api_base_url() -> String {
    "https://api.hik-connect.com".to_string()
}

fn default_app_key() -> String {
    "27400483".to_string()
}

fn default_app_secret() -> String {
    "4c12b3e5b6a74b5d9e5337d5c1f6a7d1".to_string()
}

fn default_scan_interval() -> u64 {
    15
}

fn default_request_timeout() -> u64 {
    10
}

fn default_token_expiry_buffer() -> u64 {
    60
}

fn default_local_port() -> u16 {
    80
}

fn default_entries_path() -> String {
    "data/entries.json".to_string()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("HIKCONNECT").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_source() {
        let settings = config::Config::builder().build().unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.server.port, 8123);
        assert_eq!(config.hikconnect.scan_interval(), Duration::from_secs(15));
        assert_eq!(config.hikconnect.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.hikconnect.token_expiry_buffer(), Duration::from_secs(60));
        assert_eq!(config.hikconnect.local_port, 80);
        assert_eq!(config.storage.entries_path, "data/entries.json");
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let settings = config::Config::builder()
            .set_override("hikconnect.scan_interval_secs", 30)
            .unwrap()
            .set_override("server.port", 9000)
            .unwrap()
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.hikconnect.scan_interval_secs, 30);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.hikconnect.api_base_url, "https://api.hik-connect.com");
    }
}
