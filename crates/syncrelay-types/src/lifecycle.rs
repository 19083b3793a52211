//! Per-stream lifecycle trace events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stream::StreamKey;

/// Which side of the pipeline observed the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleOrigin {
    Source,
    Destination,
    /// Emitted by the pipeline itself, e.g. force-completion at sync end.
    Internal,
}

/// Phase of a stream as reported by one origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Started,
    Running,
    Complete,
    Incomplete,
}

impl LifecyclePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Incomplete)
    }
}

/// Why a stream ended incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteCause {
    Failed,
    Canceled,
}

/// One lifecycle observation for one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamLifecycleEvent {
    pub stream: StreamKey,
    pub origin: LifecycleOrigin,
    pub phase: LifecyclePhase,
    pub emitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete_cause: Option<IncompleteCause>,
}

impl StreamLifecycleEvent {
    pub fn new(stream: StreamKey, origin: LifecycleOrigin, phase: LifecyclePhase) -> Self {
        Self {
            stream,
            origin,
            phase,
            emitted_at: Utc::now(),
            incomplete_cause: None,
        }
    }

    pub fn incomplete(stream: StreamKey, origin: LifecycleOrigin, cause: IncompleteCause) -> Self {
        Self {
            stream,
            origin,
            phase: LifecyclePhase::Incomplete,
            emitted_at: Utc::now(),
            incomplete_cause: Some(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_complete_and_incomplete_are_terminal() {
        assert!(!LifecyclePhase::Started.is_terminal());
        assert!(!LifecyclePhase::Running.is_terminal());
        assert!(LifecyclePhase::Complete.is_terminal());
        assert!(LifecyclePhase::Incomplete.is_terminal());
    }

    #[test]
    fn incomplete_event_carries_cause() {
        let ev = StreamLifecycleEvent::incomplete(
            StreamKey::unscoped("users"),
            LifecycleOrigin::Destination,
            IncompleteCause::Failed,
        );
        assert_eq!(ev.phase, LifecyclePhase::Incomplete);
        assert_eq!(ev.incomplete_cause, Some(IncompleteCause::Failed));
    }
}
