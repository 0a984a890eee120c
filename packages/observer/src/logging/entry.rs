// packages/observer/src/logging/entry.rs
//! Diagnostic event records
//!
//! A `LogEntry` describes one event emitted by the network stack: which
//! entity it belongs to, what happened, when, and optional structured
//! parameters. Anything that can render itself as a JSON value can be
//! observed via the `LogEvent` trait.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Phase of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    /// Instantaneous event
    None,

    /// Start of a phase-pair
    Begin,

    /// End of a phase-pair
    End,
}

/// Identifies the entity an event belongs to (a socket, a request, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
    /// Numeric identifier, unique per entity
    pub id: u32,

    /// Source type name (e.g. "socket", "url_request")
    pub kind: String,
}

/// A single diagnostic event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Milliseconds since the logging epoch
    pub time_ms: i64,

    /// Event type name
    pub kind: String,

    /// Entity the event belongs to
    pub source: EventSource,

    /// Event phase
    pub phase: EventPhase,

    /// Optional structured parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Anything the observer can record.
///
/// The observer only requires that an event can render itself as a JSON
/// value; the value is encoded compactly and written verbatim into the
/// `events` array of the log file.
pub trait LogEvent {
    /// Render this event as a JSON value
    fn to_value(&self) -> Value;
}

impl LogEvent for LogEntry {
    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl LogEvent for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_entry() -> LogEntry {
        LogEntry {
            time_ms: 42,
            kind: "tcp_connect".to_string(),
            source: EventSource {
                id: 7,
                kind: "socket".to_string(),
            },
            phase: EventPhase::Begin,
            params: Some(json!({"address": "127.0.0.1:80"})),
        }
    }

    #[test]
    fn test_entry_to_value() {
        let value = create_test_entry().to_value();

        assert_eq!(value["time_ms"], 42);
        assert_eq!(value["kind"], "tcp_connect");
        assert_eq!(value["source"]["id"], 7);
        assert_eq!(value["phase"], "begin");
        assert_eq!(value["params"]["address"], "127.0.0.1:80");
    }

    #[test]
    fn test_params_omitted_when_absent() {
        let mut entry = create_test_entry();
        entry.params = None;

        let value = entry.to_value();
        assert!(value.get("params").is_none());
    }

    #[test]
    fn test_raw_value_events() {
        let raw = json!({"a": 1});
        assert_eq!(raw.to_value(), json!({"a": 1}));
    }

    #[test]
    fn test_entry_round_trip() {
        let entry = create_test_entry();
        let json = serde_json::to_string(&entry).unwrap();
        let back: LogEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(back.kind, entry.kind);
        assert_eq!(back.phase, entry.phase);
        assert_eq!(back.source, entry.source);
    }
}
