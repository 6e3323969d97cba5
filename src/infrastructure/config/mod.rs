//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    pub pipeline: PipelineConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineConfig {
    /// Deadline applied to every handler call
    pub timeout_seconds: u64,
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityConfig {
    pub rate_limit: RateLimitConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitConfig {
    /// Requests admitted per window; the next one blocks the user
    pub max_requests: u32,
    pub window_seconds: u64,
    pub block_seconds: u64,
    /// Idle entries older than this are purged by the sweep
    pub retention_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window_seconds: 60,
            block_seconds: 600,
            retention_seconds: 3600,
            sweep_interval_seconds: 300,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_seconds)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuditConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "arcanus-bot".to_string(),
            },
            pipeline: PipelineConfig {
                timeout_seconds: 30,
            },
            security: SecurityConfig {
                rate_limit: RateLimitConfig::default(),
                audit: AuditConfig {
                    enabled: true,
                    path: Some(PathBuf::from("logs/audit.log")),
                },
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Override fields from environment variables where set
    pub fn apply_env(&mut self) {
        if let Ok(name) = std::env::var("BOT_NAME") {
            self.bot.name = name;
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(secs) = std::env::var("HANDLER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.pipeline.timeout_seconds = secs;
        }

        if let Ok(path) = std::env::var("AUDIT_PATH") {
            self.security.audit.path = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue("pipeline.timeout-seconds must be > 0".into()));
        }

        let rl = &self.security.rate_limit;
        let fields = [
            ("max-requests", rl.max_requests as u64),
            ("window-seconds", rl.window_seconds),
            ("block-seconds", rl.block_seconds),
            ("retention-seconds", rl.retention_seconds),
            ("sweep-interval-seconds", rl.sweep_interval_seconds),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidValue(format!(
                "security.rate-limit.{} must be > 0",
                name
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "invalid log level: {}",
                self.logging.level
            )));
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            return Err(ConfigError::InvalidValue(format!(
                "invalid log format: {}, must be 'json' or 'text'",
                self.logging.format
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_limiter_constants() {
        let config = Config::default();
        let rl = &config.security.rate_limit;
        assert_eq!(rl.max_requests, 20);
        assert_eq!(rl.window(), Duration::from_secs(60));
        assert_eq!(rl.block_duration(), Duration::from_secs(600));
        assert_eq!(rl.retention(), Duration::from_secs(3600));
        assert_eq!(rl.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.pipeline.timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_round_trip_through_default() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(yaml.contains("max-requests: 20"));
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.security.rate_limit, RateLimitConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::default();
        config.security.rate_limit.window_seconds = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("window-seconds"));
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());
    }
}
