//! Configuration loading
//!
//! Bootstrap configuration comes from one TOML file. The file is located in
//! priority order:
//! 1. Command-line argument (highest priority)
//! 2. `LO_CONFIG_FILE` environment variable
//! 3. `<config dir>/learning-observer/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! A missing default file is not an error: the service logs a warning and runs
//! on compiled defaults. An explicitly named file that does not exist is.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "LO_CONFIG_FILE";

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub kvs: KvsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Settings read by the writing-analysis reducers
    #[serde(default)]
    pub writing_observer: WritingObserverSettings,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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

/// Which key-value store backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KvsBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Key-value store settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KvsConfig {
    #[serde(default)]
    pub backend: KvsBackend,

    /// SQLite file, required when `backend = "sqlite"`
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Writing-analysis reducer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritingObserverSettings {
    /// Largest gap (seconds) counted as time on task for one interval.
    ///
    /// 60-300 in production; a few seconds is convenient when debugging.
    #[serde(default = "default_time_on_task_threshold")]
    pub time_on_task_threshold: u64,

    /// Bucket width (seconds) for binned time on task
    #[serde(default = "default_bin_size")]
    pub binned_time_on_task_bin_size: u64,

    /// Seconds without events before a student is reported inactive
    #[serde(default = "default_activity_threshold")]
    pub activity_threshold: u64,

    /// Log reducer state and events at debug level
    #[serde(default)]
    pub verbose: bool,

    /// Key document reducers by (student, document).
    ///
    /// When false they fall back to student-only scope, which treats every
    /// document a student touches as one.
    #[serde(default = "default_document_scoping")]
    pub document_scoping: bool,
}

impl Default for WritingObserverSettings {
    fn default() -> Self {
        Self {
            time_on_task_threshold: default_time_on_task_threshold(),
            binned_time_on_task_bin_size: default_bin_size(),
            activity_threshold: default_activity_threshold(),
            verbose: false,
            document_scoping: default_document_scoping(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_time_on_task_threshold() -> u64 {
    60
}

fn default_bin_size() -> u64 {
    600
}

fn default_activity_threshold() -> u64 {
    60
}

fn default_document_scoping() -> bool {
    true
}

impl TomlConfig {
    /// Parse configuration text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges and cross-field requirements
    pub fn validate(&self) -> Result<()> {
        let w = &self.writing_observer;
        if w.time_on_task_threshold == 0 {
            return Err(Error::Config(
                "writing_observer.time_on_task_threshold must be > 0".to_string(),
            ));
        }
        if w.binned_time_on_task_bin_size == 0 {
            return Err(Error::Config(
                "writing_observer.binned_time_on_task_bin_size must be > 0".to_string(),
            ));
        }
        if w.activity_threshold == 0 {
            return Err(Error::Config(
                "writing_observer.activity_threshold must be > 0".to_string(),
            ));
        }
        if self.kvs.backend == KvsBackend::Sqlite && self.kvs.database_path.is_none() {
            return Err(Error::Config(
                "kvs.database_path is required for the sqlite backend".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the configuration file came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    DefaultLocation(PathBuf),
    CompiledDefaults,
}

/// Resolves and loads the configuration file
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Pick the configuration source without reading it
    pub fn resolve(&self) -> ConfigSource {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return ConfigSource::CommandLine(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return ConfigSource::Environment(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config directory
        if let Some(path) = default_config_path() {
            if path.exists() {
                return ConfigSource::DefaultLocation(path);
            }
        }

        // Priority 4: Compiled defaults
        ConfigSource::CompiledDefaults
    }

    /// Load configuration from the resolved source
    pub fn load(&self) -> Result<TomlConfig> {
        match self.resolve() {
            ConfigSource::CommandLine(path)
            | ConfigSource::Environment(path)
            | ConfigSource::DefaultLocation(path) => {
                let config = TomlConfig::from_file(&path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            ConfigSource::CompiledDefaults => {
                warn!("No configuration file found, using compiled defaults");
                Ok(TomlConfig::default())
            }
        }
    }
}

/// `<config dir>/learning-observer/config.toml` for this platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("learning-observer").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = TomlConfig::default();
        assert_eq!(config.server.port, 8888);
        assert_eq!(config.kvs.backend, KvsBackend::Memory);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.writing_observer.time_on_task_threshold, 60);
        assert_eq!(config.writing_observer.binned_time_on_task_bin_size, 600);
        assert_eq!(config.writing_observer.activity_threshold, 60);
        assert!(config.writing_observer.document_scoping);
        assert!(!config.writing_observer.verbose);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [writing_observer]
            time_on_task_threshold = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.writing_observer.time_on_task_threshold, 5);
        assert_eq!(config.writing_observer.binned_time_on_task_bin_size, 600);
    }

    #[test]
    fn test_zero_bin_size_rejected() {
        let result = TomlConfig::from_toml_str(
            r#"
            [writing_observer]
            binned_time_on_task_bin_size = 0
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_sqlite_without_path_rejected() {
        let result = TomlConfig::from_toml_str(
            r#"
            [kvs]
            backend = "sqlite"
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("[server\nport = ");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
