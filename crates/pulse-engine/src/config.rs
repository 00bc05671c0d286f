//! Engine configuration: the resolved [`EngineConfig`] and the
//! [`PartialConfig`] callers supply to `init` and `configure`.

use std::fmt;
use std::time::Duration;

use pulse_store::StorageSettings;
use serde::Deserialize;

fn default_api_url() -> String {
    "http://127.0.0.1:8080/ingest".to_string()
}

fn default_flush_interval_ms() -> u64 {
    10_000
}

fn default_max_batch_size() -> usize {
    20
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_session_timeout_ms() -> u64 {
    30 * 60 * 1_000
}

fn default_storage_path() -> Option<String> {
    Some("pulse.db".to_string())
}

fn default_key_prefix() -> String {
    "pulse_".to_string()
}

/// Fully resolved configuration. Every field has a value.
///
/// Only ever updated through [`EngineConfig::merge`].
#[derive(Clone, PartialEq)]
pub struct EngineConfig {
    /// Project key sent with every batch.
    pub api_key: String,
    /// Collector endpoint batches are POSTed to.
    pub api_url: String,
    /// Period of the flush timer.
    pub flush_interval_ms: u64,
    /// Largest batch cut from the buffer; reaching it triggers a flush.
    pub max_batch_size: usize,
    /// Track a `pageview` on every navigation.
    pub auto_pageview: bool,
    /// Track a `click` for clicks reported by the host.
    pub capture_clicks: bool,
    /// Keep identity, properties and consent in durable storage.
    pub persistence: bool,
    /// Log filter for hosts that install a subscriber from this config.
    pub log_level: String,
    /// Inactivity after which the session rotates.
    pub session_timeout_ms: u64,
    /// SQLite file for the durable scope.
    pub storage_path: Option<String>,
    /// SQLite file for the session scope; `None` keeps it in memory.
    pub session_storage_path: Option<String>,
    /// Prefix for persisted keys.
    pub key_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: default_api_url(),
            flush_interval_ms: default_flush_interval_ms(),
            max_batch_size: default_max_batch_size(),
            auto_pageview: true,
            capture_clicks: true,
            persistence: true,
            log_level: default_log_level(),
            session_timeout_ms: default_session_timeout_ms(),
            storage_path: default_storage_path(),
            session_storage_path: None,
            key_prefix: default_key_prefix(),
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("flush_interval_ms", &self.flush_interval_ms)
            .field("max_batch_size", &self.max_batch_size)
            .field("auto_pageview", &self.auto_pageview)
            .field("capture_clicks", &self.capture_clicks)
            .field("persistence", &self.persistence)
            .field("log_level", &self.log_level)
            .field("session_timeout_ms", &self.session_timeout_ms)
            .field("storage_path", &self.storage_path)
            .field("session_storage_path", &self.session_storage_path)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl EngineConfig {
    /// Resolves `partial` against the defaults.
    pub fn resolve(partial: PartialConfig) -> Self {
        let mut config = Self::default();
        config.merge(partial);
        config
    }

    /// Applies every field present in `partial`, leaving the rest as is.
    ///
    /// A zero batch size or flush interval is clamped to 1.
    pub fn merge(&mut self, partial: PartialConfig) {
        let PartialConfig {
            api_key,
            api_url,
            flush_interval_ms,
            max_batch_size,
            auto_pageview,
            capture_clicks,
            persistence,
            log_level,
            session_timeout_ms,
            storage_path,
            session_storage_path,
            key_prefix,
        } = partial;

        if let Some(v) = api_key {
            self.api_key = v;
        }
        if let Some(v) = api_url {
            self.api_url = v;
        }
        if let Some(v) = flush_interval_ms {
            self.flush_interval_ms = v.max(1);
        }
        if let Some(v) = max_batch_size {
            self.max_batch_size = v.max(1);
        }
        if let Some(v) = auto_pageview {
            self.auto_pageview = v;
        }
        if let Some(v) = capture_clicks {
            self.capture_clicks = v;
        }
        if let Some(v) = persistence {
            self.persistence = v;
        }
        if let Some(v) = log_level {
            self.log_level = v;
        }
        if let Some(v) = session_timeout_ms {
            self.session_timeout_ms = v;
        }
        if let Some(v) = storage_path {
            self.storage_path = Some(v);
        }
        if let Some(v) = session_storage_path {
            self.session_storage_path = Some(v);
        }
        if let Some(v) = key_prefix {
            self.key_prefix = v;
        }
    }

    /// The flush timer period.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Storage layout derived from this config. Only read at construction.
    pub fn storage_settings(&self) -> StorageSettings {
        StorageSettings {
            persistence: self.persistence,
            path: self.storage_path.clone(),
            session_path: self.session_storage_path.clone(),
            key_prefix: self.key_prefix.clone(),
        }
    }
}

/// Caller-supplied configuration; absent fields keep their current value.
///
/// Deserializes from the `[engine]` table of a TOML config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PartialConfig {
    /// See [`EngineConfig::api_key`].
    pub api_key: Option<String>,
    /// See [`EngineConfig::api_url`].
    pub api_url: Option<String>,
    /// See [`EngineConfig::flush_interval_ms`].
    pub flush_interval_ms: Option<u64>,
    /// See [`EngineConfig::max_batch_size`].
    pub max_batch_size: Option<usize>,
    /// See [`EngineConfig::auto_pageview`].
    pub auto_pageview: Option<bool>,
    /// See [`EngineConfig::capture_clicks`].
    pub capture_clicks: Option<bool>,
    /// See [`EngineConfig::persistence`].
    pub persistence: Option<bool>,
    /// See [`EngineConfig::log_level`].
    pub log_level: Option<String>,
    /// See [`EngineConfig::session_timeout_ms`].
    pub session_timeout_ms: Option<u64>,
    /// See [`EngineConfig::storage_path`].
    pub storage_path: Option<String>,
    /// See [`EngineConfig::session_storage_path`].
    pub session_storage_path: Option<String>,
    /// See [`EngineConfig::key_prefix`].
    pub key_prefix: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_partial_resolves_to_defaults() {
        let config = EngineConfig::resolve(PartialConfig::default());
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.flush_interval_ms, 10_000);
        assert_eq!(config.max_batch_size, 20);
        assert_eq!(config.session_timeout_ms, 1_800_000);
        assert!(config.auto_pageview);
        assert!(config.persistence);
    }

    #[test]
    fn merge_updates_only_present_fields() {
        let mut config = EngineConfig::resolve(PartialConfig {
            api_key: Some("pk_live".to_string()),
            max_batch_size: Some(5),
            ..PartialConfig::default()
        });

        config.merge(PartialConfig {
            flush_interval_ms: Some(500),
            ..PartialConfig::default()
        });

        assert_eq!(config.api_key, "pk_live", "earlier values survive a merge");
        assert_eq!(config.max_batch_size, 5);
        assert_eq!(config.flush_interval_ms, 500);
    }

    #[test]
    fn zero_sizes_are_clamped() {
        let config = EngineConfig::resolve(PartialConfig {
            max_batch_size: Some(0),
            flush_interval_ms: Some(0),
            ..PartialConfig::default()
        });

        assert_eq!(config.max_batch_size, 1);
        assert_eq!(config.flush_interval_ms, 1);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = EngineConfig::resolve(PartialConfig {
            api_key: Some("secret-key".to_string()),
            ..PartialConfig::default()
        });

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn partial_config_leaves_missing_fields_unset() {
        let partial: PartialConfig =
            serde_json::from_str(r#"{"api_key": "pk", "max_batch_size": 3, "auto_pageview": false}"#)
                .expect("partial config should deserialize");

        assert_eq!(partial.api_key.as_deref(), Some("pk"));
        assert_eq!(partial.max_batch_size, Some(3));
        assert_eq!(partial.auto_pageview, Some(false));
        assert_eq!(partial.flush_interval_ms, None);
    }
}
