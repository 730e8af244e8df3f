//! Configuration management for reqspan.
//!
//! Supports YAML files, builder overrides, validation and defaults. The CLI
//! layers its own argument and environment overrides on top of this.

use crate::core::error::{ReqspanError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration for reqspan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Report rendering configuration
    pub report: ReportConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Requests slower than this are eligible for the slow-trace log hook
    #[serde(with = "humantime_serde")]
    pub slow_request_threshold: Duration,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Console report rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Width of the operation column in the console table
    pub operation_width: usize,
    /// Include span metadata in the chronological detail listing
    pub include_metadata: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format (targets, thread ids)
    pub structured: bool,
}

/// Log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as an `EnvFilter` directive.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            report: ReportConfig::default(),
            logging: LoggingConfig::default(),
            slow_request_threshold: Duration::from_millis(500),
            debug: false,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            operation_width: 30,
            include_metadata: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.report.operation_width < 10 || self.report.operation_width > 120 {
            return Err(ReqspanError::config(format!(
                "operation_width must be between 10 and 120, got {}",
                self.report.operation_width
            )));
        }
        if self.slow_request_threshold.is_zero() {
            return Err(ReqspanError::config(
                "slow_request_threshold must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Default config file location (`~/.config/reqspan/config.yaml`).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("reqspan").join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("~/.config/reqspan/config.yaml"))
    }
}

/// Builder for creating validated `Config` instances.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML string, replacing current values.
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| ReqspanError::config(format!("failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Sets the slow-request threshold.
    pub fn slow_request_threshold(mut self, threshold: Duration) -> Self {
        self.config.slow_request_threshold = threshold;
        self
    }

    /// Sets the console table operation column width.
    pub fn operation_width(mut self, width: usize) -> Self {
        self.config.report.operation_width = width;
        self
    }

    /// Toggles metadata in the chronological detail listing.
    pub fn include_metadata(mut self, include: bool) -> Self {
        self.config.report.include_metadata = include;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Enables debug mode.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.report.operation_width, 30);
        assert_eq!(config.slow_request_threshold, Duration::from_millis(500));
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConfigBuilder::new()
            .slow_request_threshold(Duration::from_secs(2))
            .operation_width(40)
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(config.slow_request_threshold, Duration::from_secs(2));
        assert_eq!(config.report.operation_width, 40);
        assert!(config.debug);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
report:
  operation_width: 25
  include_metadata: false
logging:
  level: debug
slow_request_threshold: 1s
"#;
        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();
        assert_eq!(config.report.operation_width, 25);
        assert!(!config.report.include_metadata);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.slow_request_threshold, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_width_rejected() {
        let result = ConfigBuilder::new().operation_width(4).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let result = ConfigBuilder::new()
            .slow_request_threshold(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }
}
