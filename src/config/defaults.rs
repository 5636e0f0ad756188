use super::*;

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            user_access: "https://onwatch.combined.energy".to_string(),
            data_access: "https://ds20.combined.energy/data-service".to_string(),
            mqtt_access: "https://dp20.combined.energy".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent_version: env!("CARGO_PKG_VERSION").to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            factor: 2,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            log_session_interval_secs: 600,
            readings_interval_secs: 60,
            tariff_interval_secs: 3600,
            readings_increment_secs: 5,
            empty_window_threshold: 3,
            reset_streak_after_renewal: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/combined_energy.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}
