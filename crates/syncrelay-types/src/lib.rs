//! Shared syncrelay protocol and data-model types.
//!
//! This crate is pure data: serde-derived message, checkpoint, and lifecycle
//! types plus the structured failure taxonomy. It performs no I/O and holds
//! no runtime state; everything stateful lives in `syncrelay-engine`.

pub mod checkpoint;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod metric;
pub mod stream;
pub mod summary;

pub use checkpoint::{CheckpointId, CheckpointState, StateMessage, StreamCheckpoint};
pub use context::ReplicationContext;
pub use error::{FailureOrigin, ReplicationError};
pub use lifecycle::{IncompleteCause, LifecycleOrigin, LifecyclePhase, StreamLifecycleEvent};
pub use message::{ControlMessage, EstimateMessage, Message, RecordMessage, TraceMessage};
pub use metric::{Metric, MetricValue};
pub use stream::StreamKey;
pub use summary::{ReplicationStatus, ReplicationSummary, StreamTotals, StreamTotalsEntry};
