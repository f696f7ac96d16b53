//! Configuration management for ClipTrail
//!
//! This module handles loading, validating, and managing configuration
//! for the ClipTrail service.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "CLIPTRAIL_CONFIG";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML rendering error
    #[error("Failed to render TOML: {0}")]
    Render(#[from] toml::ser::Error),

    /// Validation error
    #[error("Config validation failed: {0}")]
    Validation(String),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Capture loop configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// History database configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Image text recognition configuration
    #[serde(default)]
    pub ocr: OcrConfig,

    /// Listener notification configuration
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Capture loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Clipboard polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum captured payload size in bytes
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Capture images
    #[serde(default = "default_true")]
    pub capture_images: bool,

    /// Capture copied files and folders
    #[serde(default = "default_true")]
    pub capture_files: bool,

    /// Source recorded when the frontmost application is unknown
    #[serde(default = "default_fallback_source")]
    pub fallback_source: String,

    /// How long shutdown waits for background work, in milliseconds
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

/// History database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database for history
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Periodically delete records older than `retention_days`
    #[serde(default = "default_true")]
    pub auto_clean: bool,

    /// Age in days after which non-favorite records are swept
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Maximum number of non-favorite records to keep, 0 for no limit
    #[serde(default)]
    pub max_items: usize,

    /// Seconds between retention sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Image text recognition configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Run recognition on captured images
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// External recognizer reading an image on stdin, e.g. `tesseract`
    ///
    /// Overrides the platform recognizer (Vision on macOS) when set.
    #[serde(default = "default_ocr_command", skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Recognizer languages, `+` separated
    #[serde(default = "default_languages")]
    pub languages: String,

    /// Maximum concurrent recognitions
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Listener notification configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Events buffered per listener before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_max_size() -> usize {
    crate::MAX_PAYLOAD_SIZE
}

fn default_true() -> bool {
    true
}

fn default_fallback_source() -> String {
    "System".to_string()
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

fn default_database() -> PathBuf {
    PathBuf::from("~/.local/share/cliptrail/history.db")
}

fn default_retention_days() -> u32 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_ocr_command() -> Option<String> {
    None
}

fn default_languages() -> String {
    "eng".to_string()
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    10
}

// Default implementations
impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_size: default_max_size(),
            capture_images: true,
            capture_files: true,
            fallback_source: default_fallback_source(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            auto_clean: true,
            retention_days: default_retention_days(),
            max_items: 0,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_ocr_command(),
            languages: default_languages(),
            workers: default_workers(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            monitor: MonitorConfig::default(),
            storage: StorageConfig::default(),
            ocr: OcrConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl StorageConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Checks in order:
    /// 1. Path from CLIPTRAIL_CONFIG environment variable
    /// 2. <config dir>/cliptrail/config.toml
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => {
                let mut config = Self::default();
                config.expand_paths();
                Ok(config)
            }
        }
    }

    /// Load configuration with optional custom path
    pub fn load_config(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml_str)?;
        config.expand_paths();
        config.validate_config()?;
        Ok(config)
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cliptrail").join("config.toml"))
    }

    fn find_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        Self::default_path().filter(|p| p.exists())
    }

    fn expand_paths(&mut self) {
        self.storage.database = expand_path(&self.storage.database);
    }

    /// Validate configuration values
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        // Polling interval (10ms to 5s)
        if !(10..=5000).contains(&self.monitor.poll_interval_ms) {
            return Err(ConfigError::Validation(
                "poll_interval_ms must be between 10 and 5000".to_string(),
            ));
        }

        // Payload size (1KB to 200MB)
        if self.monitor.max_size < 1024 {
            return Err(ConfigError::Validation(
                "max_size must be at least 1024 bytes (1KB)".to_string(),
            ));
        }
        if self.monitor.max_size > 209_715_200 {
            return Err(ConfigError::Validation(
                "max_size must not exceed 209715200 bytes (200MB)".to_string(),
            ));
        }

        if !(1..=3650).contains(&self.storage.retention_days) {
            return Err(ConfigError::Validation(
                "retention_days must be between 1 and 3650".to_string(),
            ));
        }

        if self.storage.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "sweep_interval_secs must be at least 1".to_string(),
            ));
        }

        if !(1..=16).contains(&self.ocr.workers) {
            return Err(ConfigError::Validation(
                "ocr.workers must be between 1 and 16".to_string(),
            ));
        }

        if self.notify.queue_capacity < 1 {
            return Err(ConfigError::Validation(
                "queue_capacity must be at least 1".to_string(),
            ));
        }

        if self.monitor.fallback_source.trim().is_empty() {
            return Err(ConfigError::Validation(
                "fallback_source must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Write configuration as TOML
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Write the commented example file, refusing to overwrite unless `force`
    pub fn write_example(path: &Path, force: bool) -> Result<(), ConfigError> {
        if !force && path.exists() {
            return Err(ConfigError::Validation(
                "Config file already exists. Use --force to overwrite.".to_string(),
            ));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::generate_example())?;
        Ok(())
    }

    /// Generate example configuration file
    pub fn generate_example() -> String {
        let config = Config::default();

        format!(
            r#"# ClipTrail Configuration File
# Location: ~/.config/cliptrail/config.toml

# Logging level (trace, debug, info, warn, error)
log_level = "{}"

# Clipboard capture
[monitor]
# Polling interval in milliseconds
poll_interval_ms = {}
# Larger payloads are not recorded (20MB default)
max_size = {}
# Record copied images and files
capture_images = {}
capture_files = {}
# Source used when the frontmost application is unknown
fallback_source = "{}"
# Time given to background work on shutdown, in milliseconds
shutdown_grace_ms = {}

# History storage
[storage]
# Path to history database
database = "{}"
# Delete non-favorite records older than retention_days
auto_clean = {}
retention_days = {}
# Keep at most this many non-favorite records (0 = unlimited)
max_items = {}
# Seconds between retention sweeps
sweep_interval_secs = {}

# Text recognition for images
[ocr]
enabled = {}
# External recognizer reading an image on stdin, replaces Vision on macOS
# command = "tesseract"
languages = "{}"
# Concurrent recognitions
workers = {}

# Listener notifications
[notify]
# Events buffered per listener
queue_capacity = {}
"#,
            config.log_level,
            config.monitor.poll_interval_ms,
            config.monitor.max_size,
            config.monitor.capture_images,
            config.monitor.capture_files,
            config.monitor.fallback_source,
            config.monitor.shutdown_grace_ms,
            config.storage.database.display(),
            config.storage.auto_clean,
            config.storage.retention_days,
            config.storage.max_items,
            config.storage.sweep_interval_secs,
            config.ocr.enabled,
            config.ocr.languages,
            config.ocr.workers,
            config.notify.queue_capacity,
        )
    }
}

/// Expand tilde in path
fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(path_str.as_ref());
    PathBuf::from(expanded.into_owned())
}
