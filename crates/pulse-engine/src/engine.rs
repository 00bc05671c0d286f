//! The engine: owns every component and exposes the tracking API.

use std::sync::{Arc, Mutex, MutexGuard};

use pulse_store::{open_scoped_store, ScopedStore};
use pulse_types::{
    merge_properties, names, ActivitySignal, ClickTarget, DeliveryMode, Event, FlushResult,
    Properties, Visibility,
};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::buffer::{EventBuffer, PendingBatch};
use crate::clock::{iso_timestamp, Clock, SystemClock};
use crate::config::{EngineConfig, PartialConfig};
use crate::consent::ConsentGate;
use crate::context::{snapshot, EnvironmentProbe};
use crate::error::EngineError;
use crate::identity::Identity;
use crate::plugin::{Plugin, PluginPipeline};
use crate::scheduler::{self, FlushSignals};
use crate::session::{SessionBoundary, SessionManager};
use crate::transport::{BatchPayload, HttpTransport, Transport};

/// Longest click text kept on a `click` event, in characters.
const MAX_CLICK_TEXT: usize = 100;

/// Everything mutated by tracking. Guarded by one lock so each operation
/// sees and leaves a consistent state.
struct EngineState {
    config: EngineConfig,
    consent: ConsentGate,
    session: SessionManager,
    identity: Identity,
    buffer: EventBuffer,
    location: Option<String>,
}

pub(crate) struct EngineInner {
    state: Mutex<EngineState>,
    /// Held from the session check until the resulting events are in the
    /// buffer, so a rotation's `session_end` / `session_start` pair and the
    /// event that caused it are never split by another caller.
    enqueue_order: Mutex<()>,
    plugins: PluginPipeline,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    store: ScopedStore,
    flush_lock: tokio::sync::Mutex<()>,
    signals: Arc<FlushSignals>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.signals.shutdown.notify_one();
    }
}

/// Handle to a running engine. Clones share the same engine.
///
/// Tracking never fails: storage problems, delivery failures, and plugin
/// errors are logged and absorbed.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("session_id", &self.session_id())
            .field("buffered", &self.buffered_len())
            .field("plugins", &self.inner.plugins.len())
            .finish()
    }
}

/// Builds an [`Engine`], with optional replacements for its collaborators.
pub struct EngineBuilder {
    config: PartialConfig,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    store: Option<ScopedStore>,
    probe: Option<EnvironmentProbe>,
}

impl EngineBuilder {
    /// Replaces the HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Uses `store` instead of opening one from the storage settings.
    pub fn store(mut self, store: ScopedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses `probe` instead of probing the current process.
    pub fn probe(mut self, probe: EnvironmentProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Restores persisted state, starts or resumes the session, and spawns
    /// the flush scheduler when called inside a Tokio runtime.
    ///
    /// Without a runtime the engine still works, but only explicit
    /// [`Engine::flush`] and beacon calls deliver.
    pub fn build(self) -> Result<Engine, EngineError> {
        let config = EngineConfig::resolve(self.config);
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| open_scoped_store(&config.storage_settings()));
        let probe = self.probe.unwrap_or_else(EnvironmentProbe::from_process);

        let consent = ConsentGate::load(&store);
        let mut identity = Identity::load(&store);
        let context = snapshot(&probe);
        if !context.is_empty() {
            identity.merge_super_properties(&store, context);
        }

        let now = clock.now_ms();
        let (session, boundaries) = SessionManager::start(&store, now, config.session_timeout_ms);
        tracing::info!(
            session_id = session.session_id(),
            persistence = config.persistence,
            opted_out = consent.is_opted_out(),
            "pulse engine started"
        );

        let auto_pageview = config.auto_pageview;
        let inner = Arc::new(EngineInner {
            state: Mutex::new(EngineState {
                config,
                consent,
                session,
                identity,
                buffer: EventBuffer::new(),
                location: None,
            }),
            enqueue_order: Mutex::new(()),
            plugins: PluginPipeline::new(),
            transport,
            clock,
            store,
            flush_lock: tokio::sync::Mutex::new(()),
            signals: Arc::new(FlushSignals::default()),
            scheduler: Mutex::new(None),
        });
        let engine = Engine::from_inner(inner);

        {
            let _order = engine.enqueue_order();
            let synthesized = {
                let state = engine.state();
                if state.consent.is_opted_out() {
                    Vec::new()
                } else {
                    boundary_events(&state, boundaries, now)
                }
            };
            engine.enqueue_all(synthesized);
        }

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let task = handle.spawn(scheduler::run(
                Arc::downgrade(&engine.inner),
                engine.inner.signals.clone(),
            ));
            *engine
                .inner
                .scheduler
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(task);
        } else {
            tracing::debug!("no async runtime; flush scheduler not started");
        }

        if let Some(url) = probe.url {
            if auto_pageview {
                engine.on_navigation(url);
            } else {
                engine.state().location = Some(url);
            }
        }

        Ok(engine)
    }
}

/// Builds an event stamped with an explicit session id.
fn assemble(
    state: &EngineState,
    name: String,
    session_id: String,
    properties: &Properties,
    now_ms: i64,
) -> Event {
    Event {
        name,
        distinct_id: state.identity.distinct_id().map(str::to_string),
        session_id,
        timestamp_iso: iso_timestamp(now_ms),
        location_hint: state.location.clone(),
        properties: merge_properties(state.identity.super_properties(), properties),
    }
}

/// Turns session transitions into `session_end` / `session_start` events.
fn boundary_events(state: &EngineState, boundaries: Vec<SessionBoundary>, now_ms: i64) -> Vec<Event> {
    boundaries
        .into_iter()
        .map(|boundary| match boundary {
            SessionBoundary::Started { session_id } => assemble(
                state,
                names::SESSION_START.to_string(),
                session_id,
                &Properties::new(),
                now_ms,
            ),
            SessionBoundary::Ended {
                session_id,
                inactive_ms,
            } => {
                let mut props = Properties::new();
                props.insert("inactivity_ms".to_string(), Value::from(inactive_ms));
                assemble(
                    state,
                    names::SESSION_END.to_string(),
                    session_id,
                    &props,
                    now_ms,
                )
            }
        })
        .collect()
}

fn truncate_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_CLICK_TEXT).collect()
}

impl Engine {
    /// Starts building an engine from `config`.
    pub fn builder(config: PartialConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            transport: None,
            clock: None,
            store: None,
            probe: None,
        }
    }

    /// Builds an engine with the default collaborators.
    pub fn new(config: PartialConfig) -> Result<Self, EngineError> {
        Self::builder(config).build()
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enqueue_order(&self) -> MutexGuard<'_, ()> {
        self.inner
            .enqueue_order
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    // ---------------------------------------------------------------------
    // Tracking
    // ---------------------------------------------------------------------

    /// Records `name` with call-site `properties`.
    ///
    /// A no-op while opted out. Otherwise the session check runs first, so
    /// the event is never stamped with a session that has already ended.
    pub fn track(&self, name: impl Into<String>, properties: Properties) {
        let name = name.into();
        let _order = self.enqueue_order();
        let events = {
            let mut guard = self.state();
            let state = &mut *guard;
            if state.consent.is_opted_out() {
                tracing::trace!(event = %name, "opted out; event ignored");
                return;
            }
            let now = self.inner.clock.now_ms();
            let boundaries = state.session.touch(&self.inner.store, now);
            let mut events = boundary_events(state, boundaries, now);
            let session_id = state.session.session_id().to_string();
            events.push(assemble(state, name, session_id, &properties, now));
            events
        };
        self.enqueue_all(events);
    }

    /// Tracks `feature_adopted` for `feature`.
    pub fn track_feature_adoption(&self, feature: &str, properties: Properties) {
        let mut props = properties;
        props.insert("feature".to_string(), Value::from(feature));
        self.track(names::FEATURE_ADOPTED, props);
    }

    /// Tracks a `billing` event for `action` (e.g. `subscribe`, `upgrade`).
    pub fn track_billing(&self, action: &str, amount: f64, currency: &str, properties: Properties) {
        let mut props = properties;
        props.insert("action".to_string(), Value::from(action));
        props.insert("amount".to_string(), Value::from(amount));
        props.insert("currency".to_string(), Value::from(currency));
        self.track(names::BILLING, props);
    }

    /// Runs the plugins over `events` and appends the survivors in order,
    /// signalling the scheduler once a full batch is waiting.
    ///
    /// Caller must hold the enqueue order lock.
    fn enqueue_all(&self, events: Vec<Event>) {
        let mut full = false;
        for event in events {
            let Some(event) = self.inner.plugins.before_enqueue(event) else {
                continue;
            };
            let mut state = self.state();
            let len = state.buffer.enqueue(event);
            full |= len >= state.config.max_batch_size;
        }
        if full {
            self.inner.signals.size.notify_one();
        }
    }

    // ---------------------------------------------------------------------
    // Host environment signals
    // ---------------------------------------------------------------------

    /// Counts `signal` as session activity, rotating the session if it had
    /// gone idle. A no-op while opted out.
    pub fn record_activity(&self, signal: ActivitySignal) {
        let _order = self.enqueue_order();
        let events = {
            let mut guard = self.state();
            let state = &mut *guard;
            if state.consent.is_opted_out() {
                return;
            }
            let now = self.inner.clock.now_ms();
            tracing::trace!(signal = %signal, "activity");
            let boundaries = state.session.touch(&self.inner.store, now);
            boundary_events(state, boundaries, now)
        };
        self.enqueue_all(events);
    }

    /// Records a route change. Later events carry `url` as their location,
    /// and a `pageview` is tracked when automatic page views are on.
    pub fn on_navigation(&self, url: impl Into<String>) {
        let auto_pageview = {
            let mut state = self.state();
            if state.consent.is_opted_out() {
                return;
            }
            state.location = Some(url.into());
            state.config.auto_pageview
        };
        if auto_pageview {
            self.track(names::PAGEVIEW, Properties::new());
        }
    }

    /// Tracks a `click` on `target` when click capture is on.
    pub fn on_click(&self, target: ClickTarget) {
        if !self.state().config.capture_clicks {
            return;
        }
        let ClickTarget {
            tag,
            id,
            classes,
            text,
            href,
        } = target;

        let mut props = Properties::new();
        props.insert("tag".to_string(), Value::from(tag.to_ascii_lowercase()));
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            props.insert("id".to_string(), Value::from(id));
        }
        if !classes.is_empty() {
            props.insert("classes".to_string(), Value::from(classes));
        }
        if let Some(text) = text.map(|t| truncate_text(&t)).filter(|t| !t.is_empty()) {
            props.insert("text".to_string(), Value::from(text));
        }
        if let Some(href) = href {
            props.insert("href".to_string(), Value::from(href));
        }
        self.track(names::CLICK, props);
    }

    /// Counts a visibility change as activity; hiding the page also
    /// delivers everything buffered through the beacon path.
    pub fn on_visibility(&self, visibility: Visibility) {
        self.record_activity(ActivitySignal::VisibilityChange);
        if visibility == Visibility::Hidden {
            self.flush_beacon();
        }
    }

    // ---------------------------------------------------------------------
    // Identity, properties, consent
    // ---------------------------------------------------------------------

    /// Attributes subsequent events to `distinct_id`.
    pub fn identify(&self, distinct_id: impl Into<String>) {
        let mut state = self.state();
        state.identity.identify(&self.inner.store, distinct_id.into());
    }

    /// Merges `props` into the super-properties added to every event.
    pub fn set_super_properties(&self, props: Properties) {
        let mut state = self.state();
        state
            .identity
            .merge_super_properties(&self.inner.store, props);
    }

    /// Merges `props` into the user properties sent with every batch.
    pub fn set_user_properties(&self, props: Properties) {
        let mut state = self.state();
        state
            .identity
            .merge_user_properties(&self.inner.store, props);
    }

    /// Clears the distinct id and both property maps. Consent and the
    /// current session are left alone.
    pub fn reset(&self) {
        let mut state = self.state();
        state.identity.reset(&self.inner.store);
        tracing::debug!("identity reset");
    }

    /// Stops tracking. Events already buffered are still delivered.
    pub fn opt_out(&self) {
        let mut state = self.state();
        state.consent.opt_out(&self.inner.store);
        tracing::info!("tracking opted out");
    }

    /// Resumes tracking.
    pub fn opt_in(&self) {
        let mut state = self.state();
        state.consent.opt_in(&self.inner.store);
        tracing::info!("tracking opted in");
    }

    /// Appends `plugin` to the pipeline.
    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) {
        self.inner.plugins.register(plugin);
    }

    /// Merges `partial` into the configuration and re-arms the flush timer.
    ///
    /// Storage settings only take effect at construction.
    pub fn configure(&self, partial: PartialConfig) {
        let (len, max) = {
            let mut guard = self.state();
            let state = &mut *guard;
            state.config.merge(partial);
            state.session.set_timeout(state.config.session_timeout_ms);
            tracing::debug!(config = ?state.config, "engine reconfigured");
            (state.buffer.len(), state.config.max_batch_size)
        };
        self.inner.signals.reconfigure.notify_one();
        if len >= max {
            self.inner.signals.size.notify_one();
        }
    }

    // ---------------------------------------------------------------------
    // Delivery
    // ---------------------------------------------------------------------

    /// Sends one batch from the head of the buffer and waits for the
    /// outcome.
    ///
    /// Returns `None` when the buffer is empty; no request is made. Waits
    /// for any flush already in flight to finish first.
    pub async fn flush(&self) -> Option<FlushResult> {
        let _guard = self.inner.flush_lock.lock().await;
        self.flush_locked().await
    }

    /// Caller must hold the flush lock.
    async fn flush_locked(&self) -> Option<FlushResult> {
        let (endpoint, payload) = self.cut_payload()?;
        let count = payload.events.len();

        let result = match self.inner.transport.send(&endpoint, &payload).await {
            Ok(status) => {
                tracing::debug!(count, status, "batch delivered");
                FlushResult {
                    ok: true,
                    status: Some(status),
                    count,
                    mode: DeliveryMode::Request,
                }
            }
            Err(e) => {
                tracing::warn!(count, error = %e, "batch delivery failed");
                self.requeue(payload.events);
                FlushResult {
                    ok: false,
                    status: None,
                    count,
                    mode: DeliveryMode::Request,
                }
            }
        };

        self.inner.plugins.after_flush(&result);
        Some(result)
    }

    fn cut_payload(&self) -> Option<(String, BatchPayload)> {
        let mut guard = self.state();
        let state = &mut *guard;
        let batch = state.buffer.cut_batch(state.config.max_batch_size);
        if batch.is_empty() {
            return None;
        }
        let payload = BatchPayload {
            api_key: state.config.api_key.clone(),
            events: batch.into_events(),
            user: state.identity.user_properties().clone(),
        };
        Some((state.config.api_url.clone(), payload))
    }

    fn requeue(&self, events: Vec<Event>) {
        let count = events.len();
        self.state().buffer.requeue_front(PendingBatch::from(events));
        tracing::debug!(count, "batch requeued at head of buffer");
    }

    /// Sends full batches until the buffer holds less than one, or a
    /// delivery fails.
    pub(crate) async fn drain_full_batches(&self) {
        let _guard = self.inner.flush_lock.lock().await;
        self.drain_locked().await;
    }

    async fn drain_locked(&self) {
        loop {
            let full = {
                let state = self.state();
                state.buffer.len() >= state.config.max_batch_size
            };
            if !full {
                break;
            }
            match self.flush_locked().await {
                Some(result) if result.ok => {}
                _ => break,
            }
        }
    }

    /// One timer tick: a flush of whatever is buffered, then any full
    /// batches that remain.
    pub(crate) async fn flush_on_timer(&self) {
        let _guard = self.inner.flush_lock.lock().await;
        if let Some(result) = self.flush_locked().await {
            if result.ok {
                self.drain_locked().await;
            }
        }
    }

    /// Hands every buffered batch to the transport's fire-and-forget path
    /// without waiting.
    ///
    /// Each handed-off batch is reported to plugins as `ok` with no status
    /// and [`DeliveryMode::Beacon`]. If the transport refuses a handoff the
    /// batch is requeued and the rest stay buffered. Returns the number of
    /// events handed off.
    ///
    /// Does nothing while an awaited flush is in flight: if that flush
    /// fails, its batch must go back ahead of everything still buffered.
    pub fn flush_beacon(&self) -> usize {
        let Ok(_guard) = self.inner.flush_lock.try_lock() else {
            tracing::debug!("flush in flight; beacon skipped");
            return 0;
        };
        let mut handed_off = 0;
        while let Some((endpoint, payload)) = self.cut_payload() {
            let count = payload.events.len();
            if !self.inner.transport.send_beacon(&endpoint, &payload) {
                tracing::warn!(count, "beacon handoff refused");
                self.requeue(payload.events);
                break;
            }
            handed_off += count;
            self.inner.plugins.after_flush(&FlushResult {
                ok: true,
                status: None,
                count,
                mode: DeliveryMode::Beacon,
            });
        }
        if handed_off > 0 {
            tracing::debug!(count = handed_off, "buffer handed off via beacon");
        }
        handed_off
    }

    /// Stops the flush scheduler and delivers every remaining batch.
    ///
    /// Stops early if a delivery fails; those events stay buffered.
    /// Returns the number of events delivered.
    pub async fn shutdown(&self) -> usize {
        self.inner.signals.shutdown.notify_one();
        let task = self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "flush scheduler ended abnormally");
            }
        }

        let _guard = self.inner.flush_lock.lock().await;
        let mut delivered = 0;
        while let Some(result) = self.flush_locked().await {
            if !result.ok {
                break;
            }
            delivered += result.count;
        }
        tracing::info!(delivered, remaining = self.buffered_len(), "pulse engine shut down");
        delivered
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    pub fn session_id(&self) -> String {
        self.state().session.session_id().to_string()
    }

    pub fn distinct_id(&self) -> Option<String> {
        self.state().identity.distinct_id().map(str::to_string)
    }

    pub fn super_properties(&self) -> Properties {
        self.state().identity.super_properties().clone()
    }

    pub fn user_properties(&self) -> Properties {
        self.state().identity.user_properties().clone()
    }

    pub fn is_opted_out(&self) -> bool {
        self.state().consent.is_opted_out()
    }

    /// Number of events waiting for delivery.
    pub fn buffered_len(&self) -> usize {
        self.state().buffer.len()
    }

    /// Copies of the events waiting for delivery, head first.
    pub fn buffered_events(&self) -> Vec<Event> {
        self.state().buffer.to_vec()
    }

    /// The current resolved configuration.
    pub fn config(&self) -> EngineConfig {
        self.state().config.clone()
    }

    /// The store backing identity, consent, and the session.
    pub fn store(&self) -> &ScopedStore {
        &self.inner.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_text_is_collapsed_and_truncated() {
        assert_eq!(truncate_text("  Sign \n up  "), "Sign up");
        let long = "x".repeat(250);
        assert_eq!(truncate_text(&long).chars().count(), MAX_CLICK_TEXT);
    }
}
