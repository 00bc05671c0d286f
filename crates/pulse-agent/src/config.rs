//! Agent configuration loading from file and environment variables.

use pulse_engine::PartialConfig;
use serde::Deserialize;
use thiserror::Error;

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentConfig {
    /// Engine settings; anything left out takes the engine default.
    #[serde(default)]
    pub engine: PartialConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "pulse_engine=debug,warn"). Falls back to
    /// `engine.log_level`.
    #[serde(default)]
    pub level: Option<String>,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

impl AgentConfig {
    /// The filter directive the subscriber is built from.
    pub fn log_filter(&self) -> String {
        self.logging
            .level
            .clone()
            .or_else(|| self.engine.log_level.clone())
            .unwrap_or_else(|| "warn".to_string())
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults when the
/// file does not exist, then applies environment overrides.
///
/// Environment variable overrides:
/// - `PULSE_API_KEY` overrides `engine.api_key`
/// - `PULSE_API_URL` overrides `engine.api_url`
/// - `PULSE_FLUSH_INTERVAL_MS` overrides `engine.flush_interval_ms`
/// - `PULSE_MAX_BATCH_SIZE` overrides `engine.max_batch_size`
/// - `PULSE_STORAGE_PATH` overrides `engine.storage_path`
/// - `PULSE_LOG_LEVEL` overrides `logging.level`
/// - `PULSE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<AgentConfig, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                AgentConfig::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => AgentConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Applies `PULSE_*` overrides read through `var`. Unparseable numbers are
/// ignored.
pub fn apply_env_overrides(config: &mut AgentConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(key) = var("PULSE_API_KEY") {
        config.engine.api_key = Some(key);
    }
    if let Some(url) = var("PULSE_API_URL") {
        config.engine.api_url = Some(url);
    }
    if let Some(interval) = var("PULSE_FLUSH_INTERVAL_MS") {
        if let Ok(parsed) = interval.trim().parse() {
            config.engine.flush_interval_ms = Some(parsed);
        }
    }
    if let Some(size) = var("PULSE_MAX_BATCH_SIZE") {
        if let Ok(parsed) = size.trim().parse() {
            config.engine.max_batch_size = Some(parsed);
        }
    }
    if let Some(path) = var("PULSE_STORAGE_PATH") {
        config.engine.storage_path = Some(path);
    }
    if let Some(level) = var("PULSE_LOG_LEVEL") {
        config.logging.level = Some(level);
    }
    if let Some(json) = var("PULSE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
