//! Configuration types for the sensorhub service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_API_URL: &str = "SENSORHUB_API_URL";
pub const ENV_USER_POOL_ID: &str = "SENSORHUB_USER_POOL_ID";
pub const ENV_USER_POOL_CLIENT_ID: &str = "SENSORHUB_USER_POOL_CLIENT_ID";
pub const ENV_ID_TOKEN: &str = "SENSORHUB_ID_TOKEN";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub notices: NoticeConfig,
    #[serde(default)]
    pub sensor_ranges: Vec<SensorRange>,
}

/// Desired range of one sensor field, shown on the sensor cards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRange {
    pub sensor_id: String,
    pub field: String,
    pub min: f64,
    pub max: f64,
}

/// REST backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Identity provider settings
///
/// The pool identifiers are only carried through so the dashboard can tell a
/// browser which pool to sign in against. Tokens are issued elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub user_pool_id: String,
    #[serde(default)]
    pub user_pool_client_id: String,
    /// Token used by the background poller
    #[serde(default)]
    pub id_token: Option<String>,
    /// File holding the poller's token, re-read on every request
    #[serde(default)]
    pub id_token_file: Option<PathBuf>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            user_pool_id: String::new(),
            user_pool_client_id: String::new(),
            id_token: None,
            id_token_file: None,
        }
    }
}

/// Refetch cadence for the record snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_polling_interval", with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default = "default_true")]
    pub devices: bool,
    #[serde(default = "default_true")]
    pub sensors: bool,
    #[serde(default = "default_true")]
    pub users: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_polling_interval(),
            devices: true,
            sensors: true,
            users: true,
        }
    }
}

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
    #[serde(default = "default_fallback_path")]
    pub fallback_path: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_dashboard_port(),
            fallback_path: default_fallback_path(),
        }
    }
}

/// Lifetimes of the transient success/error banners
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeConfig {
    #[serde(default = "default_success_ttl", with = "humantime_serde")]
    pub success_ttl: Duration,
    #[serde(default = "default_error_ttl", with = "humantime_serde")]
    pub error_ttl: Duration,
    #[serde(default = "default_notice_capacity")]
    pub capacity: usize,
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            success_ttl: default_success_ttl(),
            error_ttl: default_error_ttl(),
            capacity: default_notice_capacity(),
        }
    }
}

impl Config {
    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            tracing::debug!("API base URL taken from {}", ENV_API_URL);
            self.api.base_url = url;
        }
        if let Some(pool) = lookup(ENV_USER_POOL_ID) {
            self.identity.user_pool_id = pool;
        }
        if let Some(client) = lookup(ENV_USER_POOL_CLIENT_ID) {
            self.identity.user_pool_client_id = client;
        }
        if let Some(token) = lookup(ENV_ID_TOKEN) {
            self.identity.id_token = Some(token);
        }
    }

    /// Check the settings every collaborator relies on
    pub fn validate(&self) -> crate::Result<()> {
        let url = self.api.base_url.trim();
        if url.is_empty() {
            return Err(crate::SensorhubError::Config(format!(
                "api.base_url is not set (config file or {})",
                ENV_API_URL
            )));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(crate::SensorhubError::Config(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                url
            )));
        }
        let fallback = self.dashboard.fallback_path.trim_end_matches('/');
        if !self.dashboard.fallback_path.starts_with('/') || fallback.is_empty() {
            return Err(crate::SensorhubError::Config(format!(
                "dashboard.fallback_path must be an absolute path below '/', got '{}'",
                self.dashboard.fallback_path
            )));
        }
        if let Some(range) = self.sensor_ranges.iter().find(|r| r.min > r.max) {
            return Err(crate::SensorhubError::Config(format!(
                "sensor range for '{}' has min > max",
                range.sensor_id
            )));
        }
        if self.polling.interval.is_zero() {
            return Err(crate::SensorhubError::Config(
                "polling.interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_polling_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_true() -> bool {
    true
}

fn default_dashboard_port() -> u16 {
    11120
}

fn default_fallback_path() -> String {
    "/dashboard".to_string()
}

fn default_success_ttl() -> Duration {
    Duration::from_secs(3)
}

fn default_error_ttl() -> Duration {
    Duration::from_secs(5)
}

fn default_notice_capacity() -> usize {
    20
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::SensorhubError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
