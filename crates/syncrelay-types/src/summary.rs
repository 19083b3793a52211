//! Result types for a completed sync.

use serde::{Deserialize, Serialize};

use crate::stream::StreamKey;

/// Terminal state of a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationStatus {
    Completed,
    Cancelled,
}

/// Emitted/committed counters for one stream (or the whole sync).
///
/// `committed` never exceeds `emitted` at the same point in logical time;
/// estimates are carried alongside when a connector provided them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTotals {
    pub records_emitted: u64,
    pub bytes_emitted: u64,
    pub records_committed: u64,
    pub bytes_committed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_records: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_bytes: Option<u64>,
}

/// Per-stream totals row in a [`ReplicationSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTotalsEntry {
    pub stream: StreamKey,
    pub totals: StreamTotals,
}

/// Final accounting for a sync that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationSummary {
    pub status: ReplicationStatus,
    pub totals: StreamTotals,
    pub per_stream: Vec<StreamTotalsEntry>,
    pub duration_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_roundtrips_through_json() {
        let summary = ReplicationSummary {
            status: ReplicationStatus::Completed,
            totals: StreamTotals {
                records_emitted: 100,
                bytes_emitted: 4096,
                records_committed: 100,
                bytes_committed: 4096,
                estimated_records: Some(100),
                estimated_bytes: None,
            },
            per_stream: vec![StreamTotalsEntry {
                stream: StreamKey::unscoped("users"),
                totals: StreamTotals::default(),
            }],
            duration_secs: 1.5,
        };
        let json = serde_json::to_string(&summary).unwrap();
        let back: ReplicationSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(summary, back);
    }
}
