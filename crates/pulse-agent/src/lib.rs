//! Pulse agent: feeds newline-delimited JSON events from stdin into a
//! Pulse engine and delivers them to the configured collector.

pub mod config;
pub mod ingest;

use pulse_engine::EngineError;
use thiserror::Error;

/// Errors that stop the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("failed to start engine: {0}")]
    Engine(#[from] EngineError),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}
