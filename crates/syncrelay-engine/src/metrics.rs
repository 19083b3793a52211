//! Metrics surface: the core emits, collaborators consume.

use std::sync::Mutex;

use syncrelay_types::{Metric, MetricValue};

/// Destination for metric observations.
///
/// Implementations must be cheap and non-blocking; tracker critical sections
/// emit through this while holding their lock.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, metric: Metric);

    fn counter(&self, name: &str, value: u64) {
        self.emit(Metric::counter(name, value));
    }

    fn gauge(&self, name: &str, value: f64) {
        self.emit(Metric::gauge(name, value));
    }

    fn histogram(&self, name: &str, value: f64) {
        self.emit(Metric::histogram(name, value));
    }
}

/// Default sink: logs every observation at debug level.
#[derive(Debug, Default)]
pub struct LoggingMetricsSink;

impl MetricsSink for LoggingMetricsSink {
    fn emit(&self, metric: Metric) {
        match metric.value {
            MetricValue::Counter(v) => {
                tracing::debug!(name = metric.name, value = v, "metric counter");
            }
            MetricValue::Gauge(v) => {
                tracing::debug!(name = metric.name, value = v, "metric gauge");
            }
            MetricValue::Histogram(v) => {
                tracing::debug!(name = metric.name, value = v, "metric histogram");
            }
            _ => tracing::debug!(name = metric.name, "metric"),
        }
    }
}

/// In-memory sink for tests and embedders that scrape after the fact.
#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
    observations: Mutex<Vec<Metric>>,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<Metric> {
        self.observations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Sum of all counter observations with the given name.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.observations()
            .iter()
            .filter(|m| m.name == name)
            .filter_map(|m| match m.value {
                MetricValue::Counter(v) => Some(v),
                _ => None,
            })
            .sum()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn emit(&self, metric: Metric) {
        self.observations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(metric);
    }
}
