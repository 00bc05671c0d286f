//! The event record and property helpers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A property mapping attached to events, super-properties, and user
/// properties.
pub type Properties = Map<String, Value>;

/// A single tracked occurrence.
///
/// Events are assembled by the engine and never mutated after they enter
/// the buffer. The serde layout is the collector wire format, so field
/// names follow the collector (`event`, `distinct_id`, `url`) rather than
/// the Rust names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name (e.g. `signup`, `session_start`).
    #[serde(rename = "event")]
    pub name: String,
    /// Identified user, if `identify` has been called.
    #[serde(
        rename = "distinct_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub distinct_id: Option<String>,
    /// Session the event is attributed to. Always present.
    pub session_id: String,
    /// ISO 8601 timestamp with millisecond precision.
    #[serde(rename = "timestamp")]
    pub timestamp_iso: String,
    /// Location the event happened at, if known.
    #[serde(rename = "url", default, skip_serializing_if = "Option::is_none")]
    pub location_hint: Option<String>,
    /// Super-properties merged with call-site properties.
    #[serde(default)]
    pub properties: Properties,
}

/// Merges `overlay` into a copy of `base`; keys in `overlay` win.
pub fn merge_properties(base: &Properties, overlay: &Properties) -> Properties {
    let mut merged = base.clone();
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
