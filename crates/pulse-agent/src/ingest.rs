//! Newline-delimited JSON event intake.
//!
//! Each non-blank line is an object such as
//! `{"event": "signup", "properties": {"plan": "pro"}}`. An optional
//! `distinct_id` identifies the user before the event is tracked. Lines
//! starting with `#` are ignored.

use pulse_engine::{Engine, Properties};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LineEvent {
    pub event: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub distinct_id: Option<String>,
}

/// Counters for one intake run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub tracked: usize,
    pub skipped: usize,
}

/// Parses one line. Blank and comment lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<LineEvent>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}

/// Tracks every event read from `reader` until end of input.
///
/// Malformed lines are logged and skipped.
pub async fn run_ingest<R>(engine: &Engine, reader: R) -> std::io::Result<IngestStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = IngestStats::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        match parse_line(&line) {
            Ok(Some(LineEvent {
                event,
                properties,
                distinct_id,
            })) => {
                if let Some(id) = distinct_id {
                    engine.identify(id);
                }
                engine.track(event, properties);
                stats.tracked += 1;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed event line");
                stats.skipped += 1;
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_with_properties() {
        let parsed = parse_line(r#"{"event": "signup", "properties": {"plan": "pro"}}"#)
            .expect("line should parse")
            .expect("line should carry an event");

        assert_eq!(parsed.event, "signup");
        assert_eq!(parsed.properties["plan"], "pro");
        assert_eq!(parsed.distinct_id, None);
    }

    #[test]
    fn properties_are_optional() {
        let parsed = parse_line(r#"{"event": "ping", "distinct_id": "u1"}"#)
            .unwrap()
            .unwrap();

        assert!(parsed.properties.is_empty());
        assert_eq!(parsed.distinct_id.as_deref(), Some("u1"));
    }

    #[test]
    fn blank_and_comment_lines_are_ignored() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# replayed from staging").unwrap(), None);
    }

    #[test]
    fn missing_event_name_is_an_error() {
        assert!(parse_line(r#"{"properties": {}}"#).is_err());
        assert!(parse_line("not json").is_err());
    }
}
