#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pulse_engine::{
    BatchPayload, Engine, EnvironmentProbe, FlushResult, ManualClock, PartialConfig, Plugin,
    PluginError, Properties, ScopedStore, StoreScope, Transport, TransportError,
};
use pulse_store::keys;
use serde_json::Value;
use tokio::sync::Notify;

pub const START_MS: i64 = 1_700_000_000_000;

/// One delivery attempt seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct Attempt {
    pub names: Vec<String>,
    pub delivered: bool,
}

/// Transport double: answers from a script, defaulting to `200`.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<u16, String>>>,
    attempts: Mutex<Vec<Attempt>>,
    beacons: Mutex<Vec<Vec<String>>>,
    refuse_beacons: AtomicBool,
    sent: Notify,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, times: usize) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..times {
            script.push_back(Err("connection reset".to_string()));
        }
    }

    pub fn respond_next(&self, status: u16) {
        self.script.lock().unwrap().push_back(Ok(status));
    }

    pub fn refuse_beacons(&self, refuse: bool) {
        self.refuse_beacons.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<Vec<String>> {
        self.attempts()
            .into_iter()
            .filter(|a| a.delivered)
            .map(|a| a.names)
            .collect()
    }

    pub fn beacons(&self) -> Vec<Vec<String>> {
        self.beacons.lock().unwrap().clone()
    }

    /// Waits until at least `count` attempts have been made.
    pub async fn wait_for_attempts(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.sent.notified();
                if self.attempts.lock().unwrap().len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("should reach expected number of delivery attempts");
    }
}

fn names(payload: &BatchPayload) -> Vec<String> {
    payload.events.iter().map(|e| e.name.clone()).collect()
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _endpoint: &str, payload: &BatchPayload) -> Result<u16, TransportError> {
        let outcome = self.script.lock().unwrap().pop_front().unwrap_or(Ok(200));
        self.attempts.lock().unwrap().push(Attempt {
            names: names(payload),
            delivered: outcome.is_ok(),
        });
        self.sent.notify_waiters();
        outcome.map_err(TransportError::Unreachable)
    }

    fn send_beacon(&self, _endpoint: &str, payload: &BatchPayload) -> bool {
        if self.refuse_beacons.load(Ordering::SeqCst) {
            return false;
        }
        self.beacons.lock().unwrap().push(names(payload));
        true
    }
}

/// Records every flush result it is shown.
#[derive(Default)]
pub struct RecordingPlugin {
    results: Mutex<Vec<FlushResult>>,
}

impl RecordingPlugin {
    pub fn results(&self) -> Vec<FlushResult> {
        self.results.lock().unwrap().clone()
    }
}

impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        "recorder"
    }

    fn after_flush(&self, result: &FlushResult) -> Result<(), PluginError> {
        self.results.lock().unwrap().push(*result);
        Ok(())
    }
}

/// A store that already holds an active session last seen at `now_ms`, so
/// a new engine resumes it without queueing `session_start`.
pub fn seeded_store(now_ms: i64) -> ScopedStore {
    let store = ScopedStore::in_memory("test_");
    store.set(StoreScope::Session, keys::SESSION, "seeded-session");
    store.set(StoreScope::Local, keys::LAST_ACTIVITY, &now_ms.to_string());
    store
}

pub struct Harness {
    pub engine: Engine,
    pub transport: Arc<ScriptedTransport>,
    pub clock: ManualClock,
    pub recorder: Arc<RecordingPlugin>,
}

impl Harness {
    pub fn names(&self) -> Vec<String> {
        self.engine
            .buffered_events()
            .into_iter()
            .map(|e| e.name)
            .collect()
    }
}

/// An engine resuming a seeded session, with a scripted transport, a
/// manual clock, and a recording plugin.
pub fn harness(config: PartialConfig) -> Harness {
    harness_with_store(config, seeded_store(START_MS), ManualClock::new(START_MS))
}

pub fn harness_with_store(config: PartialConfig, store: ScopedStore, clock: ManualClock) -> Harness {
    let transport = ScriptedTransport::new();
    let recorder = Arc::new(RecordingPlugin::default());
    let engine = Engine::builder(config)
        .transport(transport.clone())
        .clock(Arc::new(clock.clone()))
        .store(store)
        .probe(EnvironmentProbe::default())
        .build()
        .expect("engine should build");
    engine.register_plugin(recorder.clone());
    Harness {
        engine,
        transport,
        clock,
        recorder,
    }
}

/// A config that never flushes on its own within a test.
pub fn quiet_config(max_batch_size: usize) -> PartialConfig {
    PartialConfig {
        api_key: Some("pk_test".to_string()),
        max_batch_size: Some(max_batch_size),
        flush_interval_ms: Some(3_600_000),
        ..PartialConfig::default()
    }
}

pub fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        other => panic!("expected JSON object, got {other}"),
    }
}
