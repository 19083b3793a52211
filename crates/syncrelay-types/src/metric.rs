//! Metric observations emitted by the replication core.

use serde::{Deserialize, Serialize};

/// Type of a metric measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    /// Monotonically increasing count.
    Counter(u64),
    /// Point-in-time gauge reading.
    Gauge(f64),
    /// Single observation for histogram aggregation.
    Histogram(f64),
}

/// A single metric observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
    /// Key-value labels for metric dimensions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<(String, String)>,
}

impl Metric {
    pub fn counter(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Counter(value),
            labels: Vec::new(),
        }
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Gauge(value),
            labels: Vec::new(),
        }
    }

    pub fn histogram(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Histogram(value),
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }
}

/// Metric names emitted by the replication core.
pub mod names {
    pub const RECORDS_READ_FROM_SOURCE: &str = "records_read_from_source";
    pub const BYTES_READ_FROM_SOURCE: &str = "bytes_read_from_source";
    pub const RECORDS_WRITTEN_TO_DESTINATION: &str = "records_written_to_destination";
    pub const BYTES_WRITTEN_TO_DESTINATION: &str = "bytes_written_to_destination";

    pub const FROM_SOURCE_QUEUE_DEPTH: &str = "from_source_queue_depth";
    pub const TO_DESTINATION_QUEUE_DEPTH: &str = "to_destination_queue_depth";

    pub const SOURCE_CHECKPOINTS_OBSERVED: &str = "source_checkpoints_observed";
    pub const DESTINATION_CHECKPOINTS_OBSERVED: &str = "destination_checkpoints_observed";
    pub const STATE_COLLISION_FROM_SOURCE: &str = "state_collision_from_source";
    pub const UNEXPECTED_STATE_FROM_DESTINATION: &str = "unexpected_state_from_destination";

    pub const SOURCE_HEARTBEAT_FAILURE: &str = "source_heartbeat_failure";
    pub const DESTINATION_ACCEPT_TIMEOUT: &str = "destination_accept_timeout";
    pub const DESTINATION_NOTIFY_END_OF_INPUT_TIMEOUT: &str =
        "destination_notify_end_of_input_timeout";

    pub const SOURCE_IS_FINISHED_SECS: &str = "source_is_finished_secs";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_roundtrip_with_labels() {
        let m = Metric::counter(names::RECORDS_READ_FROM_SOURCE, 42)
            .with_label("stream", "users");
        let json = serde_json::to_string(&m).unwrap();
        let back: Metric = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }

    #[test]
    fn empty_labels_are_omitted() {
        let json = serde_json::to_value(Metric::gauge(names::FROM_SOURCE_QUEUE_DEPTH, 3.0)).unwrap();
        assert!(json.get("labels").is_none());
    }
}
