//! Environment-level configuration.
//!
//! Defaults can be overridden from the environment (`BOXOFFICE_*`) or a YAML
//! file, and every value that matters per call is overridable again on the
//! [`RequestDescriptor`](crate::request::RequestDescriptor).

use crate::error::{Error, ErrorContext};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_API_URL: &str = "BOXOFFICE_API_URL";
pub const ENV_TIMEOUT_MS: &str = "BOXOFFICE_TIMEOUT_MS";
pub const ENV_MAX_RETRIES: &str = "BOXOFFICE_MAX_RETRIES";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "BOXOFFICE_RETRY_BASE_DELAY_MS";
pub const ENV_RETRY_MAX_DELAY_MS: &str = "BOXOFFICE_RETRY_MAX_DELAY_MS";
pub const ENV_REALTIME_URL: &str = "BOXOFFICE_REALTIME_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub realtime: RealtimeConfig,
    /// Path (relative to `base_url`) of the token refresh endpoint.
    pub refresh_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api/v1".to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            realtime: RealtimeConfig::default(),
            refresh_path: "/auth/refresh-token".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    /// Treat local timeouts as retryable.
    pub retry_timeouts: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            retry_timeouts: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub url: Option<String>,
    #[serde(with = "duration_ms")]
    pub heartbeat_interval: Duration,
    pub max_reconnect_attempts: u32,
    #[serde(with = "duration_ms")]
    pub reconnect_base_delay: Duration,
    #[serde(with = "duration_ms")]
    pub reconnect_max_delay: Duration,
    pub jitter: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: None,
            heartbeat_interval: Duration::from_secs(25),
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with any `BOXOFFICE_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Overlay `BOXOFFICE_*` environment variables onto this config.
    pub fn merge_env(mut self) -> Result<Self> {
        if let Some(url) = env_string(ENV_API_URL) {
            self.base_url = url;
        }
        if let Some(ms) = env_parse::<u64>(ENV_TIMEOUT_MS)? {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<u32>(ENV_MAX_RETRIES)? {
            self.retry.max_retries = n;
        }
        if let Some(ms) = env_parse::<u64>(ENV_RETRY_BASE_DELAY_MS)? {
            self.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>(ENV_RETRY_MAX_DELAY_MS)? {
            self.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(url) = env_string(ENV_REALTIME_URL) {
            self.realtime.url = Some(url);
        }
        Ok(self)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration(
                "invalid client configuration",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        })
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(
                "unable to read configuration file",
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.retry.max_retries = n;
        self
    }

    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry.base_delay = base;
        self.retry.max_delay = max;
        self
    }

    pub fn with_realtime_url(mut self, url: impl Into<String>) -> Self {
        self.realtime.url = Some(url.into());
        self
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
            Error::configuration(
                "invalid environment value",
                ErrorContext::new()
                    .with_field_path(name)
                    .with_details(format!("{:?}: {}", raw, e))
                    .with_source("config_loader"),
            )
        }),
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = ClientConfig::default();
        assert_eq!(c.timeout, Duration::from_secs(30));
        assert_eq!(c.retry.max_retries, 3);
        assert_eq!(c.realtime.max_reconnect_attempts, 5);
        assert_eq!(c.refresh_path, "/auth/refresh-token");
    }

    #[test]
    fn test_yaml_partial_override() {
        let c = ClientConfig::from_yaml_str(
            r#"
base_url: https://api.boxoffice.test/v1
timeout: 5000
retry:
  max_retries: 1
  base_delay: 250
realtime:
  url: wss://rt.boxoffice.test
"#,
        )
        .unwrap();
        assert_eq!(c.base_url, "https://api.boxoffice.test/v1");
        assert_eq!(c.timeout, Duration::from_secs(5));
        assert_eq!(c.retry.max_retries, 1);
        assert_eq!(c.retry.base_delay, Duration::from_millis(250));
        assert_eq!(c.retry.max_delay, Duration::from_secs(30));
        assert_eq!(c.realtime.url.as_deref(), Some("wss://rt.boxoffice.test"));
    }

    #[test]
    fn test_yaml_error_is_configuration() {
        let err = ClientConfig::from_yaml_str("timeout: [oops]").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_builder_setters() {
        let c = ClientConfig::new("http://x")
            .with_timeout(Duration::from_millis(10))
            .with_max_retries(0)
            .with_retry_delays(Duration::from_millis(1), Duration::from_millis(2))
            .with_realtime_url("ws://x/rt");
        assert_eq!(c.base_url, "http://x");
        assert_eq!(c.retry.max_retries, 0);
        assert_eq!(c.retry.max_delay, Duration::from_millis(2));
        assert_eq!(c.realtime.url.as_deref(), Some("ws://x/rt"));
    }

    // The only test in this crate that touches process environment.
    #[test]
    fn test_merge_env_overlay_and_invalid_value() {
        std::env::set_var(ENV_MAX_RETRIES, "1");
        std::env::set_var(ENV_TIMEOUT_MS, " 2500 ");
        let c = ClientConfig::new("http://x").merge_env().unwrap();
        assert_eq!(c.timeout, Duration::from_millis(2500));
        assert_eq!(c.retry.max_retries, 1);
        assert_eq!(c.base_url, "http://x");

        std::env::set_var(ENV_TIMEOUT_MS, "thirty seconds");
        let err = ClientConfig::new("http://x").merge_env().unwrap_err();
        std::env::remove_var(ENV_TIMEOUT_MS);
        std::env::remove_var(ENV_MAX_RETRIES);

        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert!(err.to_string().contains(ENV_TIMEOUT_MS));
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let original = ClientConfig::new("https://api.boxoffice.test/v2")
            .with_timeout(Duration::from_millis(1500))
            .with_max_retries(4)
            .with_realtime_url("wss://rt.boxoffice.test/socket")
            .with_refresh_path("/session/refresh");
        let path = std::env::temp_dir().join(format!(
            "boxoffice-config-{}.yaml",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, serde_yaml::to_string(&original).unwrap()).unwrap();

        let loaded = ClientConfig::from_yaml_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.unwrap(), original);

        let err = ClientConfig::from_yaml_file(&path).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }
}
