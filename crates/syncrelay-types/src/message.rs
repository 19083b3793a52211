//! Messages exchanged with source and destination connectors.

use serde::{Deserialize, Serialize};

use crate::checkpoint::StateMessage;
use crate::lifecycle::StreamLifecycleEvent;
use crate::stream::StreamKey;

/// A single data record read from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMessage {
    pub stream: StreamKey,
    pub data: serde_json::Value,
    pub emitted_at_millis: i64,
}

impl RecordMessage {
    /// Approximate serialized size of the record payload in bytes.
    ///
    /// Counting walks the JSON tree instead of serializing it; byte counts
    /// feed accounting, not billing, so close-enough beats exact-but-slow.
    pub fn approximate_size_bytes(&self) -> u64 {
        approximate_json_size(&self.data)
    }
}

fn approximate_json_size(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Null => 4,
        serde_json::Value::Bool(b) => {
            if *b {
                4
            } else {
                5
            }
        }
        serde_json::Value::Number(_) => 8,
        serde_json::Value::String(s) => s.len() as u64 + 2,
        serde_json::Value::Array(items) => {
            2 + items.iter().map(approximate_json_size).sum::<u64>() + items.len() as u64
        }
        serde_json::Value::Object(fields) => {
            2 + fields
                .iter()
                .map(|(k, v)| k.len() as u64 + 4 + approximate_json_size(v))
                .sum::<u64>()
        }
    }
}

/// Byte/row volume estimate, distinct from checkpoints.
///
/// Estimates set, not accumulate. Per-stream and sync-level estimates are
/// mutually exclusive for a given sync; the later kind wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum EstimateMessage {
    Stream {
        stream: StreamKey,
        bytes: u64,
        records: u64,
    },
    Sync { bytes: u64, records: u64 },
}

/// Out-of-band observability message from a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceMessage {
    StreamStatus(StreamLifecycleEvent),
    Estimate(EstimateMessage),
    Error { message: String },
    Analytics { name: String, value: String },
}

/// Connector-reported configuration mutation.
///
/// The pipeline forwards these to an external collaborator untouched; the
/// payload is opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub payload: serde_json::Value,
}

/// Anything a connector can put on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Record(RecordMessage),
    State(StateMessage),
    Trace(TraceMessage),
    Control(ControlMessage),
}
