//! Bootstrap configuration loading
//!
//! All process-wide settings (port, log level, timing constants, audio buffer
//! sizes) live in one explicit [`Config`] value that is handed to constructors at
//! startup. Nothing reads ambient global state after that point.
//!
//! # Resolution order
//!
//! 1. Command-line argument (highest priority)
//! 2. `SITH_CONFIG` environment variable
//! 3. Per-user config file (`~/.config/sith/config.toml` on Linux)
//! 4. Built-in defaults (every field has one)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SITH_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP port for the event stream / health endpoints
    pub port: u16,

    pub logging: LoggingConfig,
    pub session: SessionConfig,
    pub audio: AudioConfig,
    pub events: EventsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Emit ANSI colors
    pub color: bool,
}

/// Backend session settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay after a login update before the session is declared usable.
    ///
    /// The backend keeps doing internal setup right after reporting login.
    pub settle_delay_ms: u64,

    /// Path to the backend application key
    pub app_key_path: PathBuf,
}

/// Audio output pipeline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Number of delivered audio chunks held before new ones are rejected
    pub queue_capacity: usize,

    /// Hardware buffer length in frames (also the staging buffer length)
    pub buffer_frames: u32,

    /// Delay applied after repeated stream configuration failures
    pub reconfigure_backoff_ms: u64,
}

/// Notification transport settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity
    pub capacity: usize,

    /// SSE keep-alive interval
    pub keep_alive_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8107,
            logging: LoggingConfig::default(),
            session: SessionConfig::default(),
            audio: AudioConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            color: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 2000,
            app_key_path: PathBuf::from("spotify_appkey.key"),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            buffer_frames: 2048,
            reconfigure_backoff_ms: 1000,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            keep_alive_secs: 15,
        }
    }
}

impl SessionConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl AudioConfig {
    pub fn reconfigure_backoff(&self) -> Duration {
        Duration::from_millis(self.reconfigure_backoff_ms)
    }
}

impl Config {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve and load configuration following the priority order above
    ///
    /// An explicitly requested file (CLI or env) must exist; the per-user file is
    /// optional and silently skipped when absent.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) => {
                info!("Using configuration file {}", path.display());
                Self::load(&path)
            }
            None => {
                info!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values the pipeline and event bus cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.audio.queue_capacity == 0 {
            return Err(Error::Config("audio.queue_capacity must be > 0".to_string()));
        }
        if self.audio.buffer_frames == 0 {
            return Err(Error::Config("audio.buffer_frames must be > 0".to_string()));
        }
        if self.events.capacity == 0 {
            return Err(Error::Config("events.capacity must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Pick the config file path, if any
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_file().filter(|path| path.exists())
}

/// Per-user config location for the platform
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sith").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8107);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.session.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.audio.queue_capacity, 16);
        assert_eq!(config.audio.buffer_frames, 2048);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            port = 9000

            [audio]
            buffer_frames = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.audio.buffer_frames, 1024);
        assert_eq!(config.audio.queue_capacity, 16);
        assert_eq!(config.events.capacity, 100);
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let result = Config::from_toml_str("[audio]\nqueue_capacity = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::from_toml_str("port = \"not a number\"");
        assert!(matches!(result, Err(Error::Toml(_))));
    }
}
