//! Configuration management for the Combined Energy client
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable overrides.

use crate::error::{CombinedEnergyError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Environment variable overriding `account.identity`
pub const ENV_IDENTITY: &str = "COMBINED_ENERGY_IDENTITY";
/// Environment variable overriding `account.password`
pub const ENV_PASSWORD: &str = "COMBINED_ENERGY_PASSWORD";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Account credentials
    pub account: AccountConfig,

    /// Upstream base URLs
    pub endpoints: EndpointsConfig,

    /// HTTP transport settings
    pub http: HttpConfig,

    /// Refresh cadence of the three pollers
    pub polling: PollingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Account used to log in to the Combined Energy cloud
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Mobile number or e-mail address
    pub identity: String,

    /// Account password
    pub password: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("identity", &self.identity)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Base URLs of the three upstream services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Login and installation lookups
    pub user_access: String,

    /// Readings and tariff details
    pub data_access: String,

    /// Log session keep-alive
    pub mqtt_access: String,
}

/// HTTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Version reported in the User-Agent header
    pub user_agent_version: String,

    /// Retry policy for 503 responses
    pub retry: RetryConfig,
}

/// Exponential backoff applied to retryable responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,

    /// Multiplier applied to the delay after each retry
    pub factor: u32,
}

/// Refresh cadence of the pollers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Log session keep-alive interval in seconds
    pub log_session_interval_secs: u64,

    /// Readings poll interval in seconds
    pub readings_interval_secs: u64,

    /// Tariff details refresh interval in seconds
    pub tariff_interval_secs: u64,

    /// Sample width requested from the readings endpoint in seconds
    pub readings_increment_secs: u32,

    /// Consecutive empty readings windows that force a log session renewal (0 disables)
    pub empty_window_threshold: usize,

    /// Clear the empty-window history after a forced renewal
    pub reset_streak_after_renewal: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (or directory)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl RetryConfig {
    /// Delay before the first retry
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl HttpConfig {
    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PollingConfig {
    pub fn log_session_interval(&self) -> Duration {
        Duration::from_secs(self.log_session_interval_secs)
    }

    pub fn readings_interval(&self) -> Duration {
        Duration::from_secs(self.readings_interval_secs)
    }

    pub fn tariff_interval(&self) -> Duration {
        Duration::from_secs(self.tariff_interval_secs)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first existing default location, then apply env overrides
    pub fn load() -> Result<Self> {
        let default_paths = [
            "combined_energy.yaml",
            "/data/combined_energy.yaml",
            "/etc/combined-energy/config.yaml",
        ];

        let mut config = default_paths
            .iter()
            .copied()
            .find(|p| Path::new(p).exists())
            .map(Self::from_file)
            .transpose()?
            .unwrap_or_default();

        config.apply_env_overrides();
        Ok(config)
    }

    /// Override credentials from the environment when set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(identity) = std::env::var(ENV_IDENTITY)
            && !identity.trim().is_empty()
        {
            self.account.identity = identity;
        }
        if let Ok(password) = std::env::var(ENV_PASSWORD)
            && !password.is_empty()
        {
            self.account.password = password;
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (field, url) in [
            ("endpoints.user_access", &self.endpoints.user_access),
            ("endpoints.data_access", &self.endpoints.data_access),
            ("endpoints.mqtt_access", &self.endpoints.mqtt_access),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CombinedEnergyError::validation(
                    field,
                    "Must be an http(s) URL",
                ));
            }
        }

        if self.http.timeout_secs == 0 {
            return Err(CombinedEnergyError::validation(
                "http.timeout_secs",
                "Must be greater than 0",
            ));
        }

        if self.http.retry.max_attempts == 0 {
            return Err(CombinedEnergyError::validation(
                "http.retry.max_attempts",
                "Must be at least 1",
            ));
        }

        if self.http.retry.factor == 0 {
            return Err(CombinedEnergyError::validation(
                "http.retry.factor",
                "Must be at least 1",
            ));
        }

        for (field, value) in [
            (
                "polling.log_session_interval_secs",
                self.polling.log_session_interval_secs,
            ),
            (
                "polling.readings_interval_secs",
                self.polling.readings_interval_secs,
            ),
            (
                "polling.tariff_interval_secs",
                self.polling.tariff_interval_secs,
            ),
        ] {
            if value == 0 {
                return Err(CombinedEnergyError::validation(
                    field,
                    "Must be greater than 0",
                ));
            }
        }

        if self.polling.readings_increment_secs == 0 {
            return Err(CombinedEnergyError::validation(
                "polling.readings_increment_secs",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}
