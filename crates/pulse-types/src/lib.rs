//! Shared types for the Pulse telemetry engine.
//!
//! This crate holds the data model every other Pulse crate agrees on: the
//! [`Event`] record that travels from `track` to the collector, the
//! property map alias, activity and visibility signals raised by the host
//! environment, and the [`FlushResult`] reported to plugins after each
//! delivery attempt.
//!
//! It depends only on `serde` and `serde_json` (properties are a JSON
//! object map), so instrumentation helpers and framework bindings can
//! depend on it without pulling in the engine.

use serde::{Deserialize, Serialize};

mod event;
pub use event::{merge_properties, Event, Properties};

/// Reserved event names synthesized by the engine itself.
pub mod names {
    /// Emitted when a new session becomes active.
    pub const SESSION_START: &str = "session_start";
    /// Emitted for the old session when inactivity rotates it.
    pub const SESSION_END: &str = "session_end";
    /// Emitted on navigation when automatic page views are enabled.
    pub const PAGEVIEW: &str = "pageview";
    /// Emitted by click capture.
    pub const CLICK: &str = "click";
    /// Emitted by the feature-adoption convenience wrapper.
    pub const FEATURE_ADOPTED: &str = "feature_adopted";
    /// Emitted by the billing convenience wrapper.
    pub const BILLING: &str = "billing";
}

/// User activity observed by the host environment.
///
/// Every signal counts as activity for the session inactivity timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySignal {
    /// A pointer click.
    Click,
    /// A key press.
    Keypress,
    /// A scroll of the viewport or a scroll container.
    Scroll,
    /// Pointer movement.
    PointerMove,
    /// A touch gesture began.
    TouchStart,
    /// The page became visible or hidden.
    VisibilityChange,
}

impl ActivitySignal {
    /// Returns the canonical label for this signal.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Keypress => "keypress",
            Self::Scroll => "scroll",
            Self::PointerMove => "pointer_move",
            Self::TouchStart => "touch_start",
            Self::VisibilityChange => "visibility_change",
        }
    }
}

impl std::fmt::Display for ActivitySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page visibility as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// The page is in the foreground.
    Visible,
    /// The page is being hidden or unloaded.
    Hidden,
}

/// How a batch was handed to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// An awaited request whose outcome was observed.
    #[default]
    Request,
    /// A fire-and-forget transmission; the outcome is assumed, not observed.
    Beacon,
}

/// Outcome of one delivery attempt, as reported to plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushResult {
    /// Whether the attempt completed. Non-2xx responses still count.
    pub ok: bool,
    /// HTTP status of the response, when one was observed.
    pub status: Option<u16>,
    /// Number of events in the attempted batch.
    pub count: usize,
    /// Which delivery path carried the batch.
    pub mode: DeliveryMode,
}

/// Description of a clicked element, supplied by click-capture wiring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickTarget {
    /// Lower-case tag name (e.g. `button`).
    pub tag: String,
    /// Element id, if any.
    pub id: Option<String>,
    /// Class names on the element.
    #[serde(default)]
    pub classes: Vec<String>,
    /// Visible text content.
    pub text: Option<String>,
    /// Link target for anchors.
    pub href: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_signal_labels() {
        assert_eq!(ActivitySignal::Click.as_str(), "click");
        assert_eq!(ActivitySignal::PointerMove.as_str(), "pointer_move");
        assert_eq!(ActivitySignal::TouchStart.to_string(), "touch_start");
        assert_eq!(
            ActivitySignal::VisibilityChange.to_string(),
            "visibility_change"
        );
    }

    #[test]
    fn activity_signal_serde_matches_label() {
        for signal in [
            ActivitySignal::Click,
            ActivitySignal::Keypress,
            ActivitySignal::Scroll,
            ActivitySignal::PointerMove,
            ActivitySignal::TouchStart,
            ActivitySignal::VisibilityChange,
        ] {
            let json = serde_json::to_value(signal).unwrap();
            assert_eq!(json, signal.as_str());
        }
    }

    #[test]
    fn delivery_mode_defaults_to_request() {
        assert_eq!(DeliveryMode::default(), DeliveryMode::Request);
    }
}
