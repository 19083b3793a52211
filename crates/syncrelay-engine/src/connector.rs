//! Contracts for the source and destination collaborators.
//!
//! Connectors are external processes (or in-memory doubles in tests) that the
//! pipeline drives but does not launch or supervise. All methods take `&self`:
//! the write path and the read path of a destination are used from different
//! stages concurrently, so implementations synchronize internally, the way a
//! process handle's stdin and stdout are naturally independent.

use anyhow::Result;

use syncrelay_types::{ControlMessage, Message, RecordMessage, ReplicationContext};

/// A running source connector.
pub trait SourceConnector: Send + Sync {
    fn start(&self, ctx: &ReplicationContext) -> Result<()>;

    /// Non-blocking-ish read: `None` means nothing available right now, not
    /// end of stream. End of stream is [`SourceConnector::is_finished`].
    fn attempt_read(&self) -> Result<Option<Message>>;

    /// May itself perform I/O; the pipeline times it for observability.
    fn is_finished(&self) -> Result<bool>;

    /// Exit value once finished. Non-zero is a source failure.
    fn exit_value(&self) -> Result<i32>;

    fn close(&self) -> Result<()>;

    fn cancel(&self) -> Result<()>;
}

/// A running destination connector.
pub trait DestinationConnector: Send + Sync {
    fn start(&self, ctx: &ReplicationContext) -> Result<()>;

    /// Hand one message to the destination. Blocking; the stage timeout
    /// supervisor watches the call from outside.
    fn accept(&self, message: Message) -> Result<()>;

    /// Signal that no more input will arrive. The pipeline calls this exactly
    /// once, on every path out of the write stage, including failure.
    fn notify_end_of_input(&self) -> Result<()>;

    /// Read destination-produced state echoes and trace messages.
    fn attempt_read(&self) -> Result<Option<Message>>;

    fn is_finished(&self) -> Result<bool>;

    /// Exit value once finished. Implementations should cache after the first
    /// successful read; the pipeline may ask more than once while unwinding.
    fn exit_value(&self) -> Result<i32>;

    fn close(&self) -> Result<()>;

    fn cancel(&self) -> Result<()>;
}

/// Record transform seam: schema validation, field filtering, and mapping
/// happen here, outside the core. The process stage runs every record
/// through the mapper before forwarding it.
pub trait RecordMapper: Send + Sync {
    fn map(&self, record: RecordMessage) -> Result<RecordMessage>;
}

/// Mapper that passes records through untouched.
#[derive(Debug, Default)]
pub struct IdentityMapper;

impl RecordMapper for IdentityMapper {
    fn map(&self, record: RecordMessage) -> Result<RecordMessage> {
        Ok(record)
    }
}

/// Receiver for connector-reported configuration mutations. The pipeline
/// forwards control messages here and moves on; persistence is the
/// collaborator's problem.
pub trait ControlForwarder: Send + Sync {
    fn forward(&self, message: ControlMessage) -> Result<()>;
}

/// Forwarder that logs and drops control messages.
#[derive(Debug, Default)]
pub struct LoggingControlForwarder;

impl ControlForwarder for LoggingControlForwarder {
    fn forward(&self, message: ControlMessage) -> Result<()> {
        tracing::info!(payload = %message.payload, "Dropping control message: no forwarder configured");
        Ok(())
    }
}
