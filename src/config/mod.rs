use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Session material obtained out of band (login is not handled here)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Value of the `sessionid` cookie
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Value of the `csrftoken` cookie, also sent as `X-CSRFToken`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
}

/// Async task polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between status checks while the task is still running
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Status checks before giving up
    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: u32,
}

fn default_poll_interval() -> u64 {
    2
}

fn default_poll_max_attempts() -> u32 {
    1800
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            max_attempts: default_poll_max_attempts(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Object-storage transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Attempts for a storage request answered with 5xx
    #[serde(default = "default_storage_retries")]
    pub max_retries: u32,

    /// Base delay of the exponential backoff, in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,

    /// Idle pooled connections kept per host
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
}

fn default_storage_retries() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    200
}

fn default_storage_timeout() -> u64 {
    60
}

fn default_max_idle_per_host() -> usize {
    10
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_retries: default_storage_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_secs: default_storage_timeout(),
            max_idle_per_host: default_max_idle_per_host(),
        }
    }
}

fn default_request_timeout() -> u64 {
    10
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Platform base URL, e.g. `https://trial.example.com`
    pub site_url: String,

    #[serde(default)]
    pub session: SessionConfig,

    /// Timeout for site requests, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    pub fn new(site_url: impl Into<String>) -> Self {
        Self {
            site_url: site_url.into(),
            session: SessionConfig::default(),
            request_timeout: default_request_timeout(),
            polling: PollingConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.site_url.trim_end_matches('/'), path)
    }

    /// CRUD endpoint
    pub fn crud_url(&self) -> String {
        self.endpoint("crud/requests")
    }

    /// Async task status endpoint
    pub fn task_url(&self) -> String {
        self.endpoint("queue/task")
    }

    /// Temporary storage credential endpoint
    pub fn ack_url(&self) -> String {
        self.endpoint("cloud/ack")
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config = serde_yaml::from_str(&content)
        .context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// - ASSETLINK_SITE_URL (required)
/// - ASSETLINK_SESSION_ID, ASSETLINK_CSRF_TOKEN (optional)
/// - ASSETLINK_POLL_INTERVAL, ASSETLINK_POLL_MAX_ATTEMPTS (optional)
/// - ASSETLINK_STORAGE_RETRIES (optional)
pub fn load_from_env() -> Result<Config> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let site_url = std::env::var("ASSETLINK_SITE_URL")
        .context("ASSETLINK_SITE_URL environment variable not set")?;
    if site_url.trim().is_empty() {
        anyhow::bail!("ASSETLINK_SITE_URL is empty");
    }

    let mut config = Config::new(site_url.trim());
    config.session.session_id = std::env::var("ASSETLINK_SESSION_ID").ok();
    config.session.csrf_token = std::env::var("ASSETLINK_CSRF_TOKEN").ok();

    if let Ok(interval) = std::env::var("ASSETLINK_POLL_INTERVAL") {
        if let Ok(val) = interval.parse() {
            config.polling.interval_secs = val;
        }
    }

    if let Ok(attempts) = std::env::var("ASSETLINK_POLL_MAX_ATTEMPTS") {
        if let Ok(val) = attempts.parse() {
            config.polling.max_attempts = val;
        }
    }

    if let Ok(retries) = std::env::var("ASSETLINK_STORAGE_RETRIES") {
        if let Ok(val) = retries.parse() {
            config.storage.max_retries = val;
        }
    }

    Ok(config)
}

/// Load configuration from a YAML file when a path is given, otherwise from
/// the environment
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    match config_path {
        Some(path) => load_from_yaml(path),
        None => load_from_env(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
site_url: https://trial.example.com/
session:
  session_id: abc
  csrf_token: tok
request_timeout: 30
polling:
  interval_secs: 5
  max_attempts: 10
storage:
  max_retries: 3
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.session.session_id.as_deref(), Some("abc"));
        assert_eq!(config.request_timeout, 30);
        assert_eq!(config.polling.interval(), Duration::from_secs(5));
        assert_eq!(config.polling.max_attempts, 10);
        assert_eq!(config.storage.max_retries, 3);
        assert_eq!(config.storage.backoff_base_ms, 200);
        assert_eq!(config.crud_url(), "https://trial.example.com/crud/requests");
        assert_eq!(config.task_url(), "https://trial.example.com/queue/task");
        assert_eq!(config.ack_url(), "https://trial.example.com/cloud/ack");
    }

    #[test]
    fn test_default_values() {
        let config: Config = serde_yaml::from_str("site_url: http://localhost:8000").unwrap();

        assert!(config.session.session_id.is_none());
        assert_eq!(config.request_timeout, 10);
        assert_eq!(config.polling.interval_secs, 2);
        assert_eq!(config.polling.max_attempts, 1800);
        assert_eq!(config.storage.max_retries, 5);
        assert_eq!(config.storage.timeout_secs, 60);
    }
}
