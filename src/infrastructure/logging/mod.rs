//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::application::errors::ConfigError;
use crate::infrastructure::config::LoggingConfig;

/// Filter from `RUST_LOG` when set, otherwise from the configured level
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_lowercase()))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(env_filter(&config.level));

    let installed = match config.format.as_str() {
        "json" => builder.json().with_current_span(true).try_init(),
        _ => builder.try_init(),
    };
    installed.map_err(|e| ConfigError::InvalidValue(format!("Failed to initialize logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        assert!(env_filter("DEBUG").to_string().contains("debug"));
    }
}
