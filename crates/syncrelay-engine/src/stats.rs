//! Checkpoint/stats reconciliation.
//!
//! Turns the stream of emitted-record and state-acknowledgement events into
//! committed/emitted counters, per stream and in aggregate. Emitted counters
//! advance as records flow; committed counters advance only when the
//! destination acknowledges a checkpoint the source previously emitted, by
//! replaying the pending FIFO up to the acknowledged entry.
//!
//! Accounting anomalies here are metered and recovered locally, never
//! escalated: a bookkeeping defect is not grounds for failing an otherwise
//! healthy data transfer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use syncrelay_types::metric::names;
use syncrelay_types::{
    CheckpointId, CheckpointState, EstimateMessage, StreamKey, StreamTotals, StreamTotalsEntry,
};

use crate::metrics::MetricsSink;

/// Emitted-counter snapshot taken when the source emitted a checkpoint.
#[derive(Debug, Clone, Copy)]
struct PendingCheckpoint {
    id: CheckpointId,
    records_emitted: u64,
    bytes_emitted: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum PushOutcome {
    Appended,
    /// Sequence number not strictly greater than the last appended one.
    Collision,
    /// Stream already desynced by an earlier collision; nothing recorded.
    Desynced,
}

#[derive(Debug, PartialEq, Eq)]
enum AckOutcome {
    Committed,
    /// No pending entry carries this id.
    NotFound,
    Desynced,
}

/// Counters and pending-checkpoint FIFO for one stream (or for the
/// whole-sync scope that legacy checkpoints cover).
#[derive(Debug, Default)]
struct StreamAccounting {
    records_emitted: u64,
    bytes_emitted: u64,
    records_committed: u64,
    bytes_committed: u64,
    pending: VecDeque<PendingCheckpoint>,
    last_pending_id: Option<CheckpointId>,
    desynced: bool,
}

impl StreamAccounting {
    fn observe_record(&mut self, size_bytes: u64) {
        self.records_emitted += 1;
        self.bytes_emitted += size_bytes;
    }

    fn push_checkpoint(&mut self, id: CheckpointId) -> PushOutcome {
        if self.desynced {
            return PushOutcome::Desynced;
        }
        if self.last_pending_id.is_some_and(|last| id <= last) {
            // A repeated or regressing sequence number means the per-checkpoint
            // deltas can no longer be attributed; committed counts stay frozen
            // at the last trustworthy snapshot until the sync succeeds.
            self.desynced = true;
            self.pending.clear();
            return PushOutcome::Collision;
        }
        self.last_pending_id = Some(id);
        self.pending.push_back(PendingCheckpoint {
            id,
            records_emitted: self.records_emitted,
            bytes_emitted: self.bytes_emitted,
        });
        PushOutcome::Appended
    }

    fn acknowledge(&mut self, id: CheckpointId) -> AckOutcome {
        if self.desynced {
            return AckOutcome::Desynced;
        }
        let Some(pos) = self.pending.iter().position(|p| p.id == id) else {
            return AckOutcome::NotFound;
        };
        // Destinations routinely skip intermediate checkpoints and acknowledge
        // a later one directly; everything up to the acknowledged entry is
        // covered by it.
        let entry = self.pending[pos];
        self.records_committed = entry.records_emitted;
        self.bytes_committed = entry.bytes_emitted;
        self.pending.drain(..=pos);
        AckOutcome::Committed
    }

    fn totals(&self, sync_succeeded: bool) -> StreamTotals {
        let (records_committed, bytes_committed) = if sync_succeeded {
            // A fully successful sync implies everything emitted was durably
            // written, even when the final checkpoint was never echoed back.
            (self.records_emitted, self.bytes_emitted)
        } else {
            (self.records_committed, self.bytes_committed)
        };
        StreamTotals {
            records_emitted: self.records_emitted,
            bytes_emitted: self.bytes_emitted,
            records_committed,
            bytes_committed,
            estimated_records: None,
            estimated_bytes: None,
        }
    }
}

/// Volume estimates for the sync. Per-stream and sync-level estimates are
/// mutually exclusive; whichever kind arrives later wins wholesale.
#[derive(Debug, Default)]
enum Estimates {
    #[default]
    Unset,
    PerStream(HashMap<StreamKey, (u64, u64)>),
    SyncWide {
        bytes: u64,
        records: u64,
    },
}

#[derive(Debug, Default)]
struct TrackerState {
    streams: HashMap<StreamKey, StreamAccounting>,
    /// Whole-sync scope: every record lands here, and legacy checkpoints
    /// snapshot and commit against it.
    sync_scope: StreamAccounting,
    estimates: Estimates,
    source_checkpoints: u64,
    destination_checkpoints: u64,
}

impl TrackerState {
    fn scope_mut(&mut self, stream: Option<&StreamKey>) -> &mut StreamAccounting {
        match stream {
            Some(key) => self.streams.entry(key.clone()).or_default(),
            None => &mut self.sync_scope,
        }
    }
}

/// Shared checkpoint/stats tracker, one instance per sync.
///
/// Mutated concurrently by the source-side and destination-side stages; a
/// single tracker-wide lock keeps every call a short critical section and
/// upholds the per-stream FIFO ordering invariants.
pub struct SyncStatsTracker {
    state: Mutex<TrackerState>,
    metrics: Arc<dyn MetricsSink>,
}

impl SyncStatsTracker {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            metrics,
        }
    }

    /// Count one record flowing from source toward destination. A record
    /// whose stream could not be resolved still counts against the sync-wide
    /// totals.
    pub fn record_emitted(&self, stream: Option<&StreamKey>, size_bytes: u64) {
        let mut state = self.lock();
        state.sync_scope.observe_record(size_bytes);
        if stream.is_some() {
            state.scope_mut(stream).observe_record(size_bytes);
        }
    }

    /// Record a checkpoint the source just emitted, snapshotting the emitted
    /// counters of every stream it covers.
    pub fn checkpoint_emitted_by_source(&self, id: CheckpointId, checkpoint: &CheckpointState) {
        let mut state = self.lock();
        state.source_checkpoints += 1;
        self.metrics.counter(names::SOURCE_CHECKPOINTS_OBSERVED, 1);

        for scope in checkpoint.covered_streams() {
            let scope_owned = scope.cloned();
            match state.scope_mut(scope).push_checkpoint(id) {
                PushOutcome::Appended | PushOutcome::Desynced => {}
                PushOutcome::Collision => {
                    self.metrics.counter(names::STATE_COLLISION_FROM_SOURCE, 1);
                    tracing::warn!(
                        stream = %scope_label(scope_owned.as_ref()),
                        checkpoint = id.0,
                        "Source repeated a checkpoint sequence; per-checkpoint accounting \
                         for this stream is disabled for the rest of the sync"
                    );
                }
            }
        }
    }

    /// Apply a checkpoint acknowledgement from the destination. An
    /// acknowledgement that matches nothing pending is metered and dropped.
    pub fn checkpoint_acknowledged_by_destination(
        &self,
        id: Option<CheckpointId>,
        checkpoint: &CheckpointState,
    ) {
        let mut state = self.lock();
        state.destination_checkpoints += 1;
        self.metrics
            .counter(names::DESTINATION_CHECKPOINTS_OBSERVED, 1);

        let Some(id) = id else {
            self.metrics
                .counter(names::UNEXPECTED_STATE_FROM_DESTINATION, 1);
            tracing::warn!("Destination produced a state message with no origin sequence");
            return;
        };

        for scope in checkpoint.covered_streams() {
            let scope_owned = scope.cloned();
            match state.scope_mut(scope).acknowledge(id) {
                AckOutcome::Committed => {
                    tracing::debug!(
                        stream = %scope_label(scope_owned.as_ref()),
                        checkpoint = id.0,
                        "Checkpoint acknowledged, committed counters advanced"
                    );
                }
                AckOutcome::Desynced => {}
                AckOutcome::NotFound => {
                    self.metrics
                        .counter(names::UNEXPECTED_STATE_FROM_DESTINATION, 1);
                    tracing::warn!(
                        stream = %scope_label(scope_owned.as_ref()),
                        checkpoint = id.0,
                        "Destination acknowledged a checkpoint that is not pending; ignoring"
                    );
                }
            }
        }
    }

    /// Record a byte/row volume estimate. Estimates set, never accumulate; a
    /// sync-level estimate invalidates all per-stream estimates and vice
    /// versa.
    pub fn set_estimate(&self, estimate: &EstimateMessage) {
        let mut state = self.lock();
        match estimate {
            EstimateMessage::Stream {
                stream,
                bytes,
                records,
            } => {
                if !matches!(state.estimates, Estimates::PerStream(_)) {
                    state.estimates = Estimates::PerStream(HashMap::new());
                }
                if let Estimates::PerStream(map) = &mut state.estimates {
                    map.insert(stream.clone(), (*bytes, *records));
                }
            }
            EstimateMessage::Sync { bytes, records } => {
                state.estimates = Estimates::SyncWide {
                    bytes: *bytes,
                    records: *records,
                };
            }
        }
    }

    /// Aggregate totals for the sync.
    pub fn totals(&self, sync_succeeded: bool) -> StreamTotals {
        let state = self.lock();
        let mut totals = state.sync_scope.totals(sync_succeeded);
        if !sync_succeeded {
            // Per-stream checkpointing commits against the stream scopes, not
            // the sync scope; fold those in. A sync uses one checkpoint shape,
            // so the two commit paths never double-count.
            for accounting in state.streams.values() {
                totals.records_committed += accounting.records_committed;
                totals.bytes_committed += accounting.bytes_committed;
            }
        }
        match &state.estimates {
            Estimates::Unset => {}
            Estimates::SyncWide { bytes, records } => {
                totals.estimated_bytes = Some(*bytes);
                totals.estimated_records = Some(*records);
            }
            Estimates::PerStream(map) => {
                totals.estimated_bytes = Some(map.values().map(|(b, _)| b).sum());
                totals.estimated_records = Some(map.values().map(|(_, r)| r).sum());
            }
        }
        totals
    }

    /// Totals for every stream observed during the sync, in key order.
    pub fn per_stream_totals(&self, sync_succeeded: bool) -> Vec<StreamTotalsEntry> {
        let state = self.lock();
        let mut entries: Vec<StreamTotalsEntry> = state
            .streams
            .iter()
            .map(|(stream, accounting)| {
                let mut totals = accounting.totals(sync_succeeded);
                if let Estimates::PerStream(map) = &state.estimates {
                    if let Some((bytes, records)) = map.get(stream) {
                        totals.estimated_bytes = Some(*bytes);
                        totals.estimated_records = Some(*records);
                    }
                }
                StreamTotalsEntry {
                    stream: stream.clone(),
                    totals,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.stream.cmp(&b.stream));
        entries
    }

    /// Checkpoints observed so far as (source-emitted, destination-acknowledged).
    pub fn checkpoints_observed(&self) -> (u64, u64) {
        let state = self.lock();
        (state.source_checkpoints, state.destination_checkpoints)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn scope_label(scope: Option<&StreamKey>) -> String {
    match scope {
        Some(key) => key.to_string(),
        None => "<sync>".to_string(),
    }
}
