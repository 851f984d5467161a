//! Layered settings for the streaming TTS gateway
//!
//! Priority: environment variables (`TTS_GATEWAY__*`) > `config/{env}.toml`
//! > `config/default.toml` > struct defaults, following the same precedence
//! `voice-agent-config`'s `load_settings` uses.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP/WS listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub cors_enabled: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_enabled: false,
            cors_origins: Vec::new(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:9000".to_string()
}

/// Tunables for the per-session state machine (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_max_pending_units")]
    pub max_pending_units: usize,
    #[serde(default = "default_max_send_queue")]
    pub max_send_queue: usize,
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
    #[serde(default = "default_flush_poll_interval_ms")]
    pub flush_poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            max_pending_units: default_max_pending_units(),
            max_send_queue: default_max_send_queue(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            flush_poll_interval_ms: default_flush_poll_interval_ms(),
        }
    }
}

fn default_ttl_seconds() -> u64 {
    120
}

fn default_max_pending_units() -> usize {
    24
}

fn default_max_send_queue() -> usize {
    200
}

fn default_cleanup_interval_seconds() -> u64 {
    5
}

fn default_flush_poll_interval_ms() -> u64 {
    10
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject configurations the session state machine can't operate under.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_pending_units == 0 {
            return Err(ConfigError::Invalid(
                "session.max_pending_units must be greater than zero".to_string(),
            ));
        }
        if self.session.ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "session.ttl_seconds must be greater than zero".to_string(),
            ));
        }
        if self.session.max_send_queue == 0 {
            return Err(ConfigError::Invalid(
                "session.max_send_queue must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from files and environment, falling back to defaults for
/// anything unset. `env` selects `config/{env}.toml` (e.g. `"production"`);
/// `None` loads only `config/default.toml`.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder().add_source(File::with_name("config/default").required(false));

    if let Some(env) = env {
        builder = builder.add_source(File::with_name(&format!("config/{env}")).required(false));
    }

    let builder = builder.add_source(
        Environment::with_prefix("TTS_GATEWAY")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    tracing::debug!(bind_addr = %settings.server.bind_addr, env = ?env, "configuration loaded");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let settings = Settings::default();
        assert_eq!(settings.session.ttl_seconds, 120);
        assert_eq!(settings.session.max_pending_units, 24);
        assert_eq!(settings.session.max_send_queue, 200);
        assert_eq!(settings.session.cleanup_interval_seconds, 5);
        assert_eq!(settings.session.flush_poll_interval_ms, 10);
    }

    #[test]
    fn rejects_zero_max_pending_units() {
        let mut settings = Settings::default();
        settings.session.max_pending_units = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn load_settings_without_files_falls_back_to_defaults() {
        let settings = load_settings(None).unwrap();
        assert_eq!(settings.server.bind_addr, "0.0.0.0:9000");
    }
}
