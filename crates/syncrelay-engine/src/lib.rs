//! Replication pipeline core for syncrelay.
//!
//! Moves records from a source connector to a destination connector as an
//! ordered, checkpointed stream while tracking exactly how much data has been
//! durably committed versus merely emitted. Built from four concurrent stages
//! joined by bounded channels, with liveness and stage-timeout supervision,
//! checkpoint/stats reconciliation, and per-stream status tracking.

pub mod abort;
pub mod channel;
pub mod config;
pub mod connector;
pub mod heartbeat;
pub mod metrics;
pub mod pipeline;
pub mod stats;
pub mod status;
pub mod timeout;

// Re-export the public API for convenience
pub use channel::{BoundedChannel, OfferError};
pub use config::{DestinationTimeoutOptions, HeartbeatOptions, ReplicationOptions};
pub use connector::{
    ControlForwarder, DestinationConnector, IdentityMapper, RecordMapper, SourceConnector,
};
pub use metrics::{LoggingMetricsSink, MetricsSink, RecordingMetricsSink};
pub use pipeline::{PipelineState, ReplicationPipeline, ReplicationPipelineBuilder};
pub use stats::SyncStatsTracker;
pub use status::{
    CombinedStreamStatus, ForceCompleteScope, RecordingStatusSink, StatusSink, StreamStatusTracker,
};
