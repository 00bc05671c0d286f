//! Client-side telemetry capture and delivery.
//!
//! An [`Engine`] accepts named events, stamps them with session, identity,
//! and context metadata, and ships them in batches to a collector over
//! HTTP. Delivery is triggered by a flush timer, by the buffer reaching
//! `max_batch_size`, and by the host page being hidden.
//!
//! ```no_run
//! use pulse_engine::{Engine, PartialConfig, Properties};
//!
//! # async fn run() -> Result<(), pulse_engine::EngineError> {
//! let engine = Engine::new(PartialConfig {
//!     api_key: Some("pk_live_123".to_string()),
//!     ..PartialConfig::default()
//! })?;
//! engine.identify("user-42");
//! engine.track("signup", Properties::new());
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! Failures never reach the caller of `track`: storage falls back to
//! memory, failed batches are requeued at the head of the buffer, and
//! plugin errors are logged and skipped.

pub mod buffer;
pub mod clock;
pub mod config;
pub mod consent;
pub mod context;
pub mod engine;
pub mod error;
pub mod global;
pub mod identity;
pub mod plugin;
mod scheduler;
pub mod session;
pub mod transport;

pub use buffer::{EventBuffer, PendingBatch};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, PartialConfig};
pub use context::EnvironmentProbe;
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, PluginError, TransportError};
pub use global::{engine, init, init_with, track};
pub use plugin::Plugin;
pub use transport::{BatchPayload, HttpTransport, Transport};

pub use pulse_store::{MemoryBackend, ScopedStore, StoreScope};
pub use pulse_types::{
    names, ActivitySignal, ClickTarget, DeliveryMode, Event, FlushResult, Properties, Visibility,
};
