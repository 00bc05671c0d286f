//! The background flush loop.
//!
//! One task per engine. It waits on the flush timer, the buffer-size
//! signal, reconfiguration, and shutdown. The timer is re-armed only after
//! the flush it triggered has resolved, and every flush goes through the
//! engine's flush lock, so at most one delivery is ever in flight.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

use crate::engine::{Engine, EngineInner};

/// Wake-ups for the scheduler. Each is a single-permit [`Notify`], so a
/// signal raised while the loop is busy is picked up on the next turn.
#[derive(Debug, Default)]
pub(crate) struct FlushSignals {
    pub(crate) size: Notify,
    pub(crate) reconfigure: Notify,
    pub(crate) shutdown: Notify,
}

fn upgrade(engine: &Weak<EngineInner>) -> Option<Engine> {
    engine.upgrade().map(Engine::from_inner)
}

fn flush_interval(engine: &Weak<EngineInner>) -> Option<Duration> {
    upgrade(engine).map(|e| e.config().flush_interval())
}

/// Runs until shutdown is signalled or the engine is dropped.
pub(crate) async fn run(engine: Weak<EngineInner>, signals: Arc<FlushSignals>) {
    let Some(mut interval) = flush_interval(&engine) else {
        return;
    };
    tracing::debug!(
        interval_ms = interval.as_millis() as u64,
        "flush scheduler started"
    );
    let mut deadline = Instant::now() + interval;

    loop {
        tokio::select! {
            biased;

            _ = signals.shutdown.notified() => break,

            _ = signals.reconfigure.notified() => {
                let Some(next) = flush_interval(&engine) else { break };
                interval = next;
                deadline = Instant::now() + interval;
                tracing::debug!(interval_ms = interval.as_millis() as u64, "flush timer re-armed");
            }

            _ = signals.size.notified() => {
                let Some(strong) = upgrade(&engine) else { break };
                strong.drain_full_batches().await;
            }

            _ = sleep_until(deadline) => {
                let Some(strong) = upgrade(&engine) else { break };
                strong.flush_on_timer().await;
                deadline = Instant::now() + interval;
            }
        }
    }

    tracing::debug!("flush scheduler stopped");
}
