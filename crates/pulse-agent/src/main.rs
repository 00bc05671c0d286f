//! Pulse agent binary.
//!
//! Usage: `pulse-agent [config.toml] < events.jsonl`

use std::process::ExitCode;

use pulse_agent::config::{self, AgentConfig};
use pulse_agent::ingest::run_ingest;
use pulse_agent::AgentError;
use pulse_engine::Engine;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("PULSE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn init_tracing(config: &AgentConfig) {
    let filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "pulse agent failed");
            eprintln!("pulse-agent: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AgentError> {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("pulse.toml"));

    let config = config::load_config(selected_config_path)?;
    init_tracing(&config);

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let engine = Engine::new(config.engine)?;
    tracing::debug!(config = ?engine.config(), "engine configured");

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        res = run_ingest(&engine, stdin) => {
            let stats = res?;
            tracing::info!(tracked = stats.tracked, skipped = stats.skipped, "input exhausted");
        }
        () = shutdown_signal() => {}
    }

    let delivered = engine.shutdown().await;
    let remaining = engine.buffered_len();
    if remaining > 0 {
        tracing::warn!(delivered, remaining, "exiting with undelivered events");
    } else {
        tracing::info!(delivered, "pulse agent shut down");
    }
    Ok(())
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, draining buffer"); }
        () = terminate => { tracing::info!("received SIGTERM, draining buffer"); }
    }
}
