use serde::{Deserialize, Serialize};

/// Identity of one sync run.
///
/// Status publications are keyed by this and stale signals from a superseded
/// attempt are rejected against it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicationContext {
    pub workspace_id: String,
    pub connection_id: String,
    pub job_id: i64,
    pub attempt: u32,
}

impl ReplicationContext {
    pub fn new(
        workspace_id: impl Into<String>,
        connection_id: impl Into<String>,
        job_id: i64,
        attempt: u32,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            connection_id: connection_id.into(),
            job_id,
            attempt,
        }
    }
}
