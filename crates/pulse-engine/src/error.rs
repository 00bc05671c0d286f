//! Error types for the engine.

use thiserror::Error;

/// Errors surfaced by the engine's public API.
///
/// Tracking, flushing, and instrumentation never return these; they are
/// reserved for construction and for the global accessor.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The global engine was used before [`init`](crate::global::init).
    #[error("pulse engine is not initialized; call init() first")]
    Uninitialized,

    /// The default HTTP transport could not be built.
    #[error("failed to build delivery transport: {0}")]
    Transport(#[from] TransportError),
}

/// A delivery attempt that never completed.
///
/// A response with any HTTP status is a completed attempt and is not an
/// error.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request failed before a response arrived.
    #[error("delivery request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The batch could not be encoded.
    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    /// A custom transport could not reach the collector.
    #[error("collector unreachable: {0}")]
    Unreachable(String),
}

/// A plugin hook reported a failure. The pipeline logs it and moves on.
#[derive(Debug, Error)]
#[error("plugin '{plugin}' failed: {message}")]
pub struct PluginError {
    /// Name of the failing plugin.
    pub plugin: String,
    /// What went wrong.
    pub message: String,
}

impl PluginError {
    /// Creates an error attributed to `plugin`.
    pub fn new(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}
