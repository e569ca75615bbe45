//! Gateway configuration with validation.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the gateway listens on
    pub listen: SocketAddr,
    /// File holding the JSON ACL table
    pub acl_path: Option<PathBuf>,
    /// Statistics stream configuration
    pub stats: StatsConfig,
    /// Shutdown behaviour
    pub shutdown: ShutdownConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8082),
            acl_path: None,
            stats: StatsConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(data).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stats.max_interval_seconds == 0 {
            return Err(ConfigError::InvalidInterval(
                "max_interval_seconds cannot be 0".into(),
            ));
        }

        if self.stats.default_interval_seconds == 0
            || self.stats.default_interval_seconds > self.stats.max_interval_seconds
        {
            return Err(ConfigError::InvalidInterval(format!(
                "default_interval_seconds must be within 1..={}",
                self.stats.max_interval_seconds
            )));
        }

        if self.shutdown.drain_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "drain_timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

/// Statistics stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Interval used when a subscriber does not request one
    pub default_interval_seconds: u64,
    /// Largest interval a subscriber may request
    pub max_interval_seconds: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            default_interval_seconds: 1,
            max_interval_seconds: 3600,
        }
    }
}

/// Shutdown configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for in-flight calls once draining starts
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("cannot read configuration: {0}")]
    Io(String),
    /// Invalid statistics interval bounds
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
