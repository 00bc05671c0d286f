//! Process-wide convenience accessor.
//!
//! Library code should pass an [`Engine`] handle around. This module is for
//! the outer boundary of an application that wants a single shared engine.

use std::sync::OnceLock;

use pulse_types::Properties;

use crate::config::PartialConfig;
use crate::engine::{Engine, EngineBuilder};
use crate::error::EngineError;

static ENGINE: OnceLock<Engine> = OnceLock::new();

/// Installs the global engine built from `config`.
///
/// If one is already installed, `config` is merged into it instead.
pub fn init(config: PartialConfig) -> Result<Engine, EngineError> {
    if let Some(engine) = ENGINE.get() {
        engine.configure(config);
        return Ok(engine.clone());
    }
    init_with(Engine::builder(config))
}

/// Installs the global engine from a prepared builder. A no-op returning
/// the existing engine if one is already installed.
pub fn init_with(builder: EngineBuilder) -> Result<Engine, EngineError> {
    if let Some(engine) = ENGINE.get() {
        return Ok(engine.clone());
    }
    let built = builder.build()?;
    if ENGINE.set(built).is_err() {
        tracing::debug!("global engine installed concurrently; using existing instance");
    }
    engine()
}

/// Returns the global engine.
pub fn engine() -> Result<Engine, EngineError> {
    ENGINE.get().cloned().ok_or(EngineError::Uninitialized)
}

/// Tracks through the global engine.
pub fn track(name: impl Into<String>, properties: Properties) -> Result<(), EngineError> {
    engine()?.track(name, properties);
    Ok(())
}
