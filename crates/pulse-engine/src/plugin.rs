//! Plugins: transform or veto events before they are queued, and observe
//! delivery outcomes.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use pulse_types::{Event, FlushResult};

use crate::error::PluginError;

/// A hook set registered with the engine. Both hooks are optional.
pub trait Plugin: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Returns the event to pass on, possibly changed, or `None` to drop
    /// it for every later plugin and the buffer.
    ///
    /// Runs while the engine is queueing; calling back into the engine's
    /// tracking methods from here deadlocks.
    fn before_enqueue(&self, event: Event) -> Result<Option<Event>, PluginError> {
        Ok(Some(event))
    }

    /// Called after every delivery attempt, successful or not.
    fn after_flush(&self, _result: &FlushResult) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Plugins in registration order.
///
/// Each hook call is isolated: an error or a panic is logged and the
/// pipeline carries on with the next plugin. A failing `before_enqueue`
/// passes the event on unchanged.
#[derive(Default)]
pub struct PluginPipeline {
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl PluginPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `plugin` to the pipeline.
    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        tracing::debug!(plugin = plugin.name(), "plugin registered");
        self.plugins
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Hooks run on a copy of the list so a plugin may register another
    // plugin without deadlocking.
    fn snapshot(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Runs `before_enqueue` through every plugin. `None` means vetoed.
    pub fn before_enqueue(&self, mut event: Event) -> Option<Event> {
        for plugin in self.snapshot() {
            let backup = event.clone();
            match catch_unwind(AssertUnwindSafe(|| plugin.before_enqueue(event))) {
                Ok(Ok(Some(next))) => event = next,
                Ok(Ok(None)) => {
                    tracing::debug!(plugin = plugin.name(), event = %backup.name, "event vetoed");
                    return None;
                }
                Ok(Err(e)) => {
                    tracing::error!(plugin = plugin.name(), error = %e, "before_enqueue failed");
                    event = backup;
                }
                Err(_) => {
                    tracing::error!(plugin = plugin.name(), "before_enqueue panicked");
                    event = backup;
                }
            }
        }
        Some(event)
    }

    /// Reports `result` to every plugin.
    pub fn after_flush(&self, result: &FlushResult) {
        for plugin in self.snapshot() {
            match catch_unwind(AssertUnwindSafe(|| plugin.after_flush(result))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(plugin = plugin.name(), error = %e, "after_flush failed");
                }
                Err(_) => {
                    tracing::error!(plugin = plugin.name(), "after_flush panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_types::{DeliveryMode, Properties};
    use serde_json::Value;
    use std::sync::Mutex;

    fn event(name: &str) -> Event {
        Event {
            name: name.to_string(),
            distinct_id: None,
            session_id: "s".to_string(),
            timestamp_iso: "1970-01-01T00:00:00.000Z".to_string(),
            location_hint: None,
            properties: Properties::new(),
        }
    }

    struct Tagger(&'static str);

    impl Plugin for Tagger {
        fn name(&self) -> &str {
            self.0
        }

        fn before_enqueue(&self, mut event: Event) -> Result<Option<Event>, PluginError> {
            event
                .properties
                .insert(self.0.to_string(), Value::Bool(true));
            Ok(Some(event))
        }
    }

    struct Veto;

    impl Plugin for Veto {
        fn before_enqueue(&self, _event: Event) -> Result<Option<Event>, PluginError> {
            Ok(None)
        }
    }

    struct Failing;

    impl Plugin for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn before_enqueue(&self, _event: Event) -> Result<Option<Event>, PluginError> {
            Err(PluginError::new("failing", "boom"))
        }

        fn after_flush(&self, _result: &FlushResult) -> Result<(), PluginError> {
            panic!("after_flush exploded");
        }
    }

    #[derive(Default)]
    struct Observer {
        seen: Mutex<Vec<FlushResult>>,
    }

    impl Plugin for Observer {
        fn after_flush(&self, result: &FlushResult) -> Result<(), PluginError> {
            self.seen.lock().unwrap().push(*result);
            Ok(())
        }
    }

    #[test]
    fn mutations_flow_in_registration_order() {
        let pipeline = PluginPipeline::new();
        pipeline.register(Arc::new(Tagger("first")));
        pipeline.register(Arc::new(Tagger("second")));

        let out = pipeline.before_enqueue(event("x")).expect("should pass");

        let keys: Vec<_> = out.properties.keys().cloned().collect();
        assert_eq!(keys, ["first", "second"]);
    }

    #[test]
    fn veto_short_circuits_later_plugins() {
        let pipeline = PluginPipeline::new();
        let observer_tag = Arc::new(Tagger("late"));
        pipeline.register(Arc::new(Veto));
        pipeline.register(observer_tag);

        assert!(pipeline.before_enqueue(event("x")).is_none());
    }

    #[test]
    fn failing_hook_passes_event_on_unchanged() {
        let pipeline = PluginPipeline::new();
        pipeline.register(Arc::new(Failing));
        pipeline.register(Arc::new(Tagger("after")));

        let out = pipeline.before_enqueue(event("x")).expect("should pass");

        assert_eq!(out.name, "x");
        assert_eq!(out.properties["after"], true);
    }

    #[test]
    fn panicking_after_flush_does_not_stop_later_plugins() {
        let pipeline = PluginPipeline::new();
        let observer = Arc::new(Observer::default());
        pipeline.register(Arc::new(Failing));
        pipeline.register(observer.clone());

        let result = FlushResult {
            ok: true,
            status: Some(200),
            count: 3,
            mode: DeliveryMode::Request,
        };
        pipeline.after_flush(&result);

        assert_eq!(*observer.seen.lock().unwrap(), vec![result]);
    }

    #[test]
    fn default_hooks_are_pass_through() {
        struct Quiet;
        impl Plugin for Quiet {}

        let pipeline = PluginPipeline::new();
        pipeline.register(Arc::new(Quiet));

        assert_eq!(pipeline.before_enqueue(event("x")), Some(event("x")));
        assert_eq!(pipeline.len(), 1);
    }
}
