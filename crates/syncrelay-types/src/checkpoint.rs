//! Checkpoint (state) message shapes.
//!
//! A checkpoint marks a durability boundary the destination can acknowledge.
//! Three shapes exist: legacy whole-sync blobs, global shared-plus-per-stream
//! states, and single per-stream states. Every checkpoint that crosses the
//! pipeline carries a [`CheckpointId`] stamped at source emission time so the
//! destination's echo can be matched against what was sent, including
//! duplicate and out-of-order echoes.

use serde::{Deserialize, Serialize};

use crate::stream::StreamKey;

/// Origin sequence number of a checkpoint.
///
/// Assigned monotonically as source state messages pass through the pipeline
/// and echoed back unchanged by the destination.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CheckpointId(pub u64);

/// One stream's sub-state inside a global checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamCheckpoint {
    pub stream: StreamKey,
    pub payload: serde_json::Value,
}

/// The payload of a state message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckpointState {
    /// Single opaque blob implicitly covering the whole sync.
    Legacy { payload: serde_json::Value },
    /// Shared blob plus per-stream sub-states. Streams absent from the
    /// sub-state list are unaffected by this checkpoint.
    Global {
        shared: serde_json::Value,
        streams: Vec<StreamCheckpoint>,
    },
    /// State for exactly one stream.
    PerStream {
        stream: StreamKey,
        payload: serde_json::Value,
    },
}

impl CheckpointState {
    /// The streams this checkpoint applies to. `None` stands for the
    /// whole-sync scope of a legacy checkpoint.
    pub fn covered_streams(&self) -> Vec<Option<&StreamKey>> {
        match self {
            Self::Legacy { .. } => vec![None],
            Self::Global { streams, .. } => streams.iter().map(|s| Some(&s.stream)).collect(),
            Self::PerStream { stream, .. } => vec![Some(stream)],
        }
    }
}

/// A state message as it flows through the pipeline.
///
/// `id` is `None` until the process stage stamps it; destinations must echo
/// the id untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CheckpointId>,
    pub state: CheckpointState,
}

impl StateMessage {
    pub fn new(state: CheckpointState) -> Self {
        Self { id: None, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_covers_the_whole_sync() {
        let state = CheckpointState::Legacy {
            payload: serde_json::json!({"cursor": 7}),
        };
        assert_eq!(state.covered_streams(), vec![None]);
    }

    #[test]
    fn global_covers_only_listed_streams() {
        let users = StreamKey::unscoped("users");
        let orders = StreamKey::unscoped("orders");
        let state = CheckpointState::Global {
            shared: serde_json::json!({"lsn": "0/16B2D80"}),
            streams: vec![
                StreamCheckpoint {
                    stream: users.clone(),
                    payload: serde_json::json!({}),
                },
                StreamCheckpoint {
                    stream: orders.clone(),
                    payload: serde_json::json!({}),
                },
            ],
        };
        assert_eq!(state.covered_streams(), vec![Some(&users), Some(&orders)]);
    }

    #[test]
    fn state_message_roundtrips_with_id() {
        let mut msg = StateMessage::new(CheckpointState::PerStream {
            stream: StreamKey::unscoped("users"),
            payload: serde_json::json!({"cursor": "42"}),
        });
        msg.id = Some(CheckpointId(3));
        let json = serde_json::to_string(&msg).unwrap();
        let back: StateMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn unstamped_id_is_omitted_from_wire_form() {
        let msg = StateMessage::new(CheckpointState::Legacy {
            payload: serde_json::json!(null),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("id").is_none());
    }
}
