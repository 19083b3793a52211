//! Stream status tracking.
//!
//! Derives one authoritative lifecycle status per stream from independent
//! source and destination signals and publishes every transition to an
//! external status sink exactly once. Incomplete from either origin is
//! immediately authoritative; Complete needs agreement from both origins,
//! with the sync-end force-completion covering origins that never report.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use syncrelay_types::{
    IncompleteCause, LifecycleOrigin, LifecyclePhase, ReplicationContext, StreamKey,
    StreamLifecycleEvent,
};

/// Externally visible status of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinedStreamStatus {
    Started,
    Running,
    Complete,
    Incomplete { cause: Option<IncompleteCause> },
}

impl CombinedStreamStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Incomplete { .. })
    }
}

/// External status store, e.g. a status API client. Keyed by stream and run
/// identity; `create` registers a stream first seen, `update` advances it.
///
/// Publication failures are logged by the tracker and never fail the sync.
pub trait StatusSink: Send + Sync {
    fn create(
        &self,
        ctx: &ReplicationContext,
        stream: &StreamKey,
        status: CombinedStreamStatus,
    ) -> anyhow::Result<()>;

    fn update(
        &self,
        ctx: &ReplicationContext,
        stream: &StreamKey,
        status: CombinedStreamStatus,
    ) -> anyhow::Result<()>;
}

/// Sink that only logs. Useful when no status store is wired up.
#[derive(Debug, Default)]
pub struct LoggingStatusSink;

impl StatusSink for LoggingStatusSink {
    fn create(
        &self,
        ctx: &ReplicationContext,
        stream: &StreamKey,
        status: CombinedStreamStatus,
    ) -> anyhow::Result<()> {
        tracing::info!(stream = %stream, job = ctx.job_id, status = ?status, "Stream status created");
        Ok(())
    }

    fn update(
        &self,
        ctx: &ReplicationContext,
        stream: &StreamKey,
        status: CombinedStreamStatus,
    ) -> anyhow::Result<()> {
        tracing::info!(stream = %stream, job = ctx.job_id, status = ?status, "Stream status updated");
        Ok(())
    }
}

/// In-memory sink recording every publication, for tests and embedders.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    publications: Mutex<Vec<(StreamKey, CombinedStreamStatus)>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publications(&self) -> Vec<(StreamKey, CombinedStreamStatus)> {
        self.publications
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn publications_for(&self, stream: &StreamKey) -> Vec<CombinedStreamStatus> {
        self.publications()
            .into_iter()
            .filter(|(s, _)| s == stream)
            .map(|(_, status)| status)
            .collect()
    }
}

impl StatusSink for RecordingStatusSink {
    fn create(
        &self,
        _ctx: &ReplicationContext,
        stream: &StreamKey,
        status: CombinedStreamStatus,
    ) -> anyhow::Result<()> {
        self.publications
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((stream.clone(), status));
        Ok(())
    }

    fn update(
        &self,
        ctx: &ReplicationContext,
        stream: &StreamKey,
        status: CombinedStreamStatus,
    ) -> anyhow::Result<()> {
        self.create(ctx, stream, status)
    }
}

/// Scope of a force-completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForceCompleteScope {
    Stream(StreamKey),
    /// Every still-open stream of the current run.
    All,
}

#[derive(Debug, Default)]
struct StreamState {
    source_phase: Option<LifecyclePhase>,
    destination_phase: Option<LifecyclePhase>,
    incomplete_cause: Option<IncompleteCause>,
    incomplete: bool,
    published: Option<CombinedStreamStatus>,
}

impl StreamState {
    fn phase_slot(&mut self, origin: LifecycleOrigin) -> Option<&mut Option<LifecyclePhase>> {
        match origin {
            LifecycleOrigin::Source => Some(&mut self.source_phase),
            LifecycleOrigin::Destination => Some(&mut self.destination_phase),
            LifecycleOrigin::Internal => None,
        }
    }

    fn is_terminal(&self) -> bool {
        self.published.is_some_and(CombinedStreamStatus::is_terminal)
    }

    fn combined(&self) -> Option<CombinedStreamStatus> {
        if self.incomplete {
            return Some(CombinedStreamStatus::Incomplete {
                cause: self.incomplete_cause,
            });
        }
        // Mid-sync, Complete needs both origins to agree; an origin that
        // never reports at all is settled by force-completion at sync end.
        if self.source_phase == Some(LifecyclePhase::Complete)
            && self.destination_phase == Some(LifecyclePhase::Complete)
        {
            return Some(CombinedStreamStatus::Complete);
        }
        let most_advanced = [self.source_phase, self.destination_phase]
            .into_iter()
            .flatten()
            .max_by_key(|phase| match phase {
                LifecyclePhase::Started => 0,
                LifecyclePhase::Running => 1,
                LifecyclePhase::Complete | LifecyclePhase::Incomplete => 2,
            })?;
        match most_advanced {
            LifecyclePhase::Started => Some(CombinedStreamStatus::Started),
            _ => Some(CombinedStreamStatus::Running),
        }
    }
}

/// Derives and publishes per-stream statuses for one sync run.
pub struct StreamStatusTracker {
    ctx: ReplicationContext,
    sink: Arc<dyn StatusSink>,
    streams: Mutex<HashMap<StreamKey, StreamState>>,
}

impl StreamStatusTracker {
    pub fn new(ctx: ReplicationContext, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            ctx,
            sink,
            streams: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &ReplicationContext {
        &self.ctx
    }

    /// Fold one lifecycle observation into the stream's state, publishing if
    /// the combined status changed.
    pub fn observe(&self, event: &StreamLifecycleEvent) {
        if event.origin == LifecycleOrigin::Internal {
            // Internal events are force-completions routed through the trace
            // stream; they carry the same semantics as `force_complete`.
            self.force_complete(ForceCompleteScope::Stream(event.stream.clone()), &self.ctx);
            return;
        }

        let mut streams = self.lock();
        let state = streams.entry(event.stream.clone()).or_default();

        if state.is_terminal() {
            tracing::debug!(
                stream = %event.stream,
                phase = ?event.phase,
                origin = ?event.origin,
                "Ignoring lifecycle event for already-terminal stream"
            );
            return;
        }

        if event.phase == LifecyclePhase::Incomplete {
            state.incomplete = true;
            if state.incomplete_cause.is_none() {
                state.incomplete_cause = event.incomplete_cause;
            }
        }

        if let Some(slot) = state.phase_slot(event.origin) {
            match (*slot, event.phase) {
                // Running repeats are idempotent; regressions are dropped.
                (Some(current), incoming) if phase_rank(incoming) < phase_rank(current) => {
                    tracing::debug!(
                        stream = %event.stream,
                        current = ?current,
                        incoming = ?incoming,
                        "Dropping regressing lifecycle phase"
                    );
                }
                (None, LifecyclePhase::Running) => {
                    // Started should arrive first; tolerate the gap rather
                    // than lose the stream.
                    tracing::warn!(
                        stream = %event.stream,
                        origin = ?event.origin,
                        "Observed RUNNING with no prior STARTED"
                    );
                    *slot = Some(LifecyclePhase::Running);
                }
                (_, incoming) => *slot = Some(incoming),
            }
        }

        self.publish_if_changed(&event.stream, state);
    }

    /// Finalize streams as Complete regardless of current phase. No-op for
    /// already-terminal streams; ignored wholesale when `ctx` does not match
    /// the tracked run, which defends against stale signals from a
    /// superseded attempt.
    pub fn force_complete(&self, scope: ForceCompleteScope, ctx: &ReplicationContext) {
        if ctx != &self.ctx {
            tracing::warn!(
                job = ctx.job_id,
                attempt = ctx.attempt,
                tracked_job = self.ctx.job_id,
                tracked_attempt = self.ctx.attempt,
                "Ignoring force-complete for a different run"
            );
            return;
        }

        let mut streams = self.lock();
        match scope {
            ForceCompleteScope::Stream(key) => {
                if let Some(state) = streams.get_mut(&key) {
                    self.force_complete_one(&key, state);
                }
            }
            ForceCompleteScope::All => {
                for (key, state) in streams.iter_mut() {
                    self.force_complete_one(key, state);
                }
            }
        }
    }

    /// Combined statuses currently held, for finalization reporting.
    pub fn snapshot(&self) -> Vec<(StreamKey, CombinedStreamStatus)> {
        let streams = self.lock();
        let mut entries: Vec<_> = streams
            .iter()
            .filter_map(|(key, state)| state.published.map(|s| (key.clone(), s)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn force_complete_one(&self, key: &StreamKey, state: &mut StreamState) {
        if state.is_terminal() {
            return;
        }
        state.source_phase = Some(LifecyclePhase::Complete);
        state.destination_phase = Some(LifecyclePhase::Complete);
        self.publish_if_changed(key, state);
    }

    fn publish_if_changed(&self, key: &StreamKey, state: &mut StreamState) {
        let Some(combined) = state.combined() else {
            return;
        };
        if state.published == Some(combined) {
            return;
        }
        let result = if state.published.is_none() {
            self.sink.create(&self.ctx, key, combined)
        } else {
            self.sink.update(&self.ctx, key, combined)
        };
        if let Err(error) = result {
            // Status publication is observability, not data transfer; a sink
            // failure must not abort the sync.
            tracing::warn!(stream = %key, error = %error, "Failed to publish stream status");
        }
        state.published = Some(combined);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<StreamKey, StreamState>> {
        self.streams
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn phase_rank(phase: LifecyclePhase) -> u8 {
    match phase {
        LifecyclePhase::Started => 0,
        LifecyclePhase::Running => 1,
        LifecyclePhase::Complete | LifecyclePhase::Incomplete => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ReplicationContext {
        ReplicationContext::new("ws", "conn", 42, 1)
    }

    fn tracker() -> (StreamStatusTracker, Arc<RecordingStatusSink>) {
        let sink = Arc::new(RecordingStatusSink::new());
        (StreamStatusTracker::new(ctx(), sink.clone()), sink)
    }

    fn users() -> StreamKey {
        StreamKey::unscoped("users")
    }

    fn event(origin: LifecycleOrigin, phase: LifecyclePhase) -> StreamLifecycleEvent {
        StreamLifecycleEvent::new(users(), origin, phase)
    }

    #[test]
    fn complete_requires_agreement_from_both_origins() {
        let (tracker, sink) = tracker();
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Started));
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Running));
        tracker.observe(&event(LifecycleOrigin::Destination, LifecyclePhase::Complete));

        // Destination alone does not complete the stream.
        assert_eq!(
            sink.publications_for(&users()).last(),
            Some(&CombinedStreamStatus::Running)
        );

        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Complete));
        assert_eq!(
            sink.publications_for(&users()).last(),
            Some(&CombinedStreamStatus::Complete)
        );
    }

    #[test]
    fn destination_complete_may_arrive_before_or_after_source_complete() {
        // Source completes first.
        let (tracker, sink) = tracker();
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Started));
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Complete));
        assert_ne!(
            sink.publications_for(&users()).last(),
            Some(&CombinedStreamStatus::Complete)
        );
        tracker.observe(&event(LifecycleOrigin::Destination, LifecyclePhase::Complete));
        assert_eq!(
            sink.publications_for(&users()).last(),
            Some(&CombinedStreamStatus::Complete)
        );
    }

    #[test]
    fn incomplete_from_either_origin_wins_immediately() {
        let (tracker, sink) = tracker();
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Started));
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Running));
        tracker.observe(&StreamLifecycleEvent::incomplete(
            users(),
            LifecycleOrigin::Destination,
            IncompleteCause::Failed,
        ));

        assert_eq!(
            sink.publications_for(&users()).last(),
            Some(&CombinedStreamStatus::Incomplete {
                cause: Some(IncompleteCause::Failed)
            })
        );

        // A late Complete from the source must not regress the terminal state.
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Complete));
        assert_eq!(
            sink.publications_for(&users()).last(),
            Some(&CombinedStreamStatus::Incomplete {
                cause: Some(IncompleteCause::Failed)
            })
        );
    }

    #[test]
    fn repeated_running_publishes_once() {
        let (tracker, sink) = tracker();
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Started));
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Running));
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Running));
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Running));

        assert_eq!(
            sink.publications_for(&users()),
            vec![CombinedStreamStatus::Started, CombinedStreamStatus::Running]
        );
    }

    #[test]
    fn force_complete_finalizes_a_running_stream_exactly_once() {
        let (tracker, sink) = tracker();
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Started));
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Running));

        tracker.force_complete(ForceCompleteScope::Stream(users()), &ctx());
        tracker.force_complete(ForceCompleteScope::Stream(users()), &ctx());

        let statuses = sink.publications_for(&users());
        assert_eq!(
            statuses,
            vec![
                CombinedStreamStatus::Started,
                CombinedStreamStatus::Running,
                CombinedStreamStatus::Complete,
            ]
        );
    }

    #[test]
    fn force_complete_is_a_noop_after_natural_incompletion() {
        let (tracker, sink) = tracker();
        tracker.observe(&StreamLifecycleEvent::incomplete(
            users(),
            LifecycleOrigin::Source,
            IncompleteCause::Canceled,
        ));
        tracker.force_complete(ForceCompleteScope::All, &ctx());

        assert_eq!(
            sink.publications_for(&users()).last(),
            Some(&CombinedStreamStatus::Incomplete {
                cause: Some(IncompleteCause::Canceled)
            })
        );
    }

    #[test]
    fn force_complete_for_a_superseded_attempt_is_ignored() {
        let (tracker, sink) = tracker();
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Running));

        let stale = ReplicationContext::new("ws", "conn", 42, 0);
        tracker.force_complete(ForceCompleteScope::All, &stale);

        assert_ne!(
            sink.publications_for(&users()).last(),
            Some(&CombinedStreamStatus::Complete)
        );
    }

    #[test]
    fn wildcard_force_complete_covers_every_open_stream() {
        let (tracker, sink) = tracker();
        let orders = StreamKey::unscoped("orders");
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Running));
        tracker.observe(&StreamLifecycleEvent::new(
            orders.clone(),
            LifecycleOrigin::Source,
            LifecyclePhase::Started,
        ));

        tracker.force_complete(ForceCompleteScope::All, &ctx());

        assert_eq!(
            sink.publications_for(&users()).last(),
            Some(&CombinedStreamStatus::Complete)
        );
        assert_eq!(
            sink.publications_for(&orders).last(),
            Some(&CombinedStreamStatus::Complete)
        );
    }

    #[test]
    fn internal_origin_events_act_as_force_completion() {
        let (tracker, sink) = tracker();
        tracker.observe(&event(LifecycleOrigin::Source, LifecyclePhase::Running));
        tracker.observe(&event(LifecycleOrigin::Internal, LifecyclePhase::Complete));

        assert_eq!(
            sink.publications_for(&users()).last(),
            Some(&CombinedStreamStatus::Complete)
        );
    }
}
