//! Failure taxonomy for the replication pipeline.
//!
//! Source- and destination-side failures are terminal for the whole sync.
//! Liveness and stage-timeout overruns appear here only once their feature
//! flag escalates them; in observe-only mode they are metered and never
//! constructed. Tracker anomalies (duplicate checkpoints, unexpected
//! acknowledgements) are deliberately absent: they are metered, never thrown.

use std::time::Duration;

/// Which side of the pipeline a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureOrigin {
    Source,
    Destination,
}

/// Terminal error of a sync.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// Source read exception or non-zero source exit.
    #[error("source failure: {0}")]
    Source(anyhow::Error),

    /// Destination write/acknowledgement exception or non-zero destination exit.
    #[error("destination failure: {0}")]
    Destination(anyhow::Error),

    /// No records observed from the source within the configured silence window.
    #[error("no records from source for {silence:?}")]
    SourceHeartbeatTimeout { silence: Duration },

    /// A destination `accept` call overran its deadline.
    #[error("destination accept call exceeded {elapsed:?}")]
    DestinationAcceptTimeout { elapsed: Duration },

    /// The destination `notify_end_of_input` call overran its deadline.
    #[error("destination notify-end-of-input call exceeded {elapsed:?}")]
    DestinationNotifyEndOfInputTimeout { elapsed: Duration },

    /// The sync was cancelled from outside.
    #[error("replication cancelled")]
    Cancelled,

    /// Host-side fault: a stage panicked or the pipeline was misused.
    #[error("internal pipeline failure: {0}")]
    Internal(anyhow::Error),
}

impl ReplicationError {
    /// The side this failure is attributed to, when one exists.
    ///
    /// Heartbeat overruns count against the source, stage timeouts against
    /// the destination; cancellation and internal faults have no side.
    pub fn origin(&self) -> Option<FailureOrigin> {
        match self {
            Self::Source(_) | Self::SourceHeartbeatTimeout { .. } => Some(FailureOrigin::Source),
            Self::Destination(_)
            | Self::DestinationAcceptTimeout { .. }
            | Self::DestinationNotifyEndOfInputTimeout { .. } => Some(FailureOrigin::Destination),
            Self::Cancelled | Self::Internal(_) => None,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
