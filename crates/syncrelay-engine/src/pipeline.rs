//! The replication pipeline: four concurrent stages joined by bounded
//! channels, supervised for liveness and stalled destination calls.
//!
//! Records and state messages flow read-source → process → write-destination
//! through `from_source` and `to_destination`; destination acknowledgements
//! flow back out through the ack-reading stage. Every message crossing a
//! stage boundary is also fed, out of band, to the stats and status
//! trackers. A failure in any stage trips the shared abort latch and closes
//! both channels, so the remaining stages observe closed channels and unwind
//! within a bounded number of poll cycles.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};

use syncrelay_types::metric::names;
use syncrelay_types::{
    CheckpointId, Message, ReplicationContext, ReplicationError, ReplicationStatus,
    ReplicationSummary, TraceMessage,
};

use crate::abort::AbortSignal;
use crate::channel::{BoundedChannel, OfferError};
use crate::config::ReplicationOptions;
use crate::connector::{
    ControlForwarder, DestinationConnector, IdentityMapper, LoggingControlForwarder, RecordMapper,
    SourceConnector,
};
use crate::heartbeat::HeartbeatMonitor;
use crate::metrics::{LoggingMetricsSink, MetricsSink};
use crate::stats::SyncStatsTracker;
use crate::status::{ForceCompleteScope, LoggingStatusSink, StatusSink, StreamStatusTracker};
use crate::timeout::{DestinationCall, DestinationTimeoutMonitor};

/// Lifecycle of a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Starting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Default)]
struct WrittenCounters {
    records: AtomicU64,
    bytes: AtomicU64,
}

/// One replication run, built via [`ReplicationPipelineBuilder`].
pub struct ReplicationPipeline {
    source: Arc<dyn SourceConnector>,
    destination: Arc<dyn DestinationConnector>,
    context: ReplicationContext,
    options: ReplicationOptions,
    stats: Arc<SyncStatsTracker>,
    status: Arc<StreamStatusTracker>,
    metrics: Arc<dyn MetricsSink>,
    mapper: Arc<dyn RecordMapper>,
    control: Arc<dyn ControlForwarder>,
    from_source: Arc<BoundedChannel<Message>>,
    to_destination: Arc<BoundedChannel<Message>>,
    abort: Arc<AbortSignal>,
    written: Arc<WrittenCounters>,
    state: Mutex<PipelineState>,
}

impl ReplicationPipeline {
    pub fn builder() -> ReplicationPipelineBuilder {
        ReplicationPipelineBuilder::default()
    }

    pub fn state(&self) -> PipelineState {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The checkpoint/stats tracker for this run.
    pub fn stats(&self) -> &Arc<SyncStatsTracker> {
        &self.stats
    }

    /// The stream status tracker for this run.
    pub fn status(&self) -> &Arc<StreamStatusTracker> {
        &self.status
    }

    /// Run the sync to a terminal state.
    ///
    /// Returns the summary for a completed or cancelled sync and the failure
    /// for a failed one; in every case the trackers have been flushed, the
    /// terminal state published, and both connectors closed in
    /// reverse-acquisition order before this returns.
    pub async fn run(&self) -> Result<ReplicationSummary, ReplicationError> {
        let started_at = Instant::now();
        self.transition_from(PipelineState::Init, PipelineState::Starting)
            .map_err(ReplicationError::Internal)?;
        tracing::info!(
            workspace = self.context.workspace_id,
            connection = self.context.connection_id,
            job = self.context.job_id,
            attempt = self.context.attempt,
            channel_capacity = self.options.channel_capacity,
            "Starting replication pipeline"
        );

        let transfer = self.execute().await;

        // Reverse-acquisition order: the source was started last, so it goes
        // first. Unwind errors are logged, never thrown over the primary
        // failure.
        close_quietly("source", || self.source.close());
        close_quietly("destination", || self.destination.close());

        let duration_secs = started_at.elapsed().as_secs_f64();
        match transfer {
            Ok(()) => {
                // A fully successful sync finalizes every still-open stream
                // and defines committed as emitted.
                self.status
                    .force_complete(ForceCompleteScope::All, &self.context);
                let summary = ReplicationSummary {
                    status: ReplicationStatus::Completed,
                    totals: self.stats.totals(true),
                    per_stream: self.stats.per_stream_totals(true),
                    duration_secs,
                };
                self.set_state(PipelineState::Completed);
                tracing::info!(
                    records = summary.totals.records_emitted,
                    bytes = summary.totals.bytes_emitted,
                    duration_secs,
                    "Replication completed"
                );
                Ok(summary)
            }
            Err(error) if error.is_cancellation() => {
                let summary = ReplicationSummary {
                    status: ReplicationStatus::Cancelled,
                    totals: self.stats.totals(false),
                    per_stream: self.stats.per_stream_totals(false),
                    duration_secs,
                };
                self.set_state(PipelineState::Cancelled);
                tracing::info!(
                    records = summary.totals.records_emitted,
                    duration_secs,
                    "Replication cancelled"
                );
                Ok(summary)
            }
            Err(error) => {
                self.set_state(PipelineState::Failed);
                let totals = self.stats.totals(false);
                tracing::error!(
                    error = %error,
                    records_emitted = totals.records_emitted,
                    records_committed = totals.records_committed,
                    duration_secs,
                    "Replication failed"
                );
                Err(error)
            }
        }
    }

    /// Request cancellation. Idempotent and safe to call from any thread;
    /// trips the abort latch, closes both channels, and cancels both
    /// connectors without waiting for in-flight destination calls.
    pub fn cancel(&self) {
        if matches!(
            self.state(),
            PipelineState::Completed | PipelineState::Failed | PipelineState::Cancelled
        ) {
            tracing::debug!("Cancellation requested after the pipeline reached a terminal state");
            return;
        }
        if self.abort.trip(ReplicationError::Cancelled) {
            tracing::info!(job = self.context.job_id, "Cancelling replication");
        }
        self.from_source.close();
        self.to_destination.close();
        if let Err(error) = self.source.cancel() {
            tracing::warn!(error = %error, "Source cancel failed");
        }
        if let Err(error) = self.destination.cancel() {
            tracing::warn!(error = %error, "Destination cancel failed");
        }
    }

    async fn execute(&self) -> Result<(), ReplicationError> {
        if self.abort.is_tripped() {
            // Cancelled before the run began.
            return Err(self
                .abort
                .take_cause()
                .unwrap_or(ReplicationError::Cancelled));
        }

        // Destination first, so source records have somewhere to land;
        // `run` closes both in reverse order whatever happens from here.
        self.destination
            .start(&self.context)
            .map_err(ReplicationError::Destination)?;
        self.source
            .start(&self.context)
            .map_err(ReplicationError::Source)?;
        self.set_state(PipelineState::Running);

        let done = Arc::new(AtomicBool::new(false));
        let heartbeat = Arc::new(HeartbeatMonitor::new(self.options.heartbeat.clone()));
        let timeouts = Arc::new(DestinationTimeoutMonitor::new(
            self.options.destination_timeouts.clone(),
        ));

        let mut supervisors = tokio::task::JoinSet::new();
        supervisors.spawn(heartbeat.clone().watch(
            self.abort.clone(),
            self.metrics.clone(),
            done.clone(),
        ));
        supervisors.spawn(timeouts.clone().watch(
            self.abort.clone(),
            self.metrics.clone(),
            done.clone(),
        ));
        supervisors.spawn(unwind_watcher(
            self.abort.clone(),
            self.from_source.clone(),
            self.to_destination.clone(),
            self.source.clone(),
            self.destination.clone(),
            done.clone(),
            self.options.poll_interval,
        ));
        supervisors.spawn(report_metrics_loop(
            self.stats.clone(),
            self.written.clone(),
            self.from_source.clone(),
            self.to_destination.clone(),
            self.metrics.clone(),
            done.clone(),
            self.options.poll_interval,
            self.options.metrics_interval,
        ));

        let mut stages = tokio::task::JoinSet::new();

        {
            let source = self.source.clone();
            let from_source = self.from_source.clone();
            let to_destination = self.to_destination.clone();
            let heartbeat = heartbeat.clone();
            let metrics = self.metrics.clone();
            let abort = self.abort.clone();
            let poll = self.options.poll_interval;
            stages.spawn(async move {
                let channel = from_source.clone();
                let abort_for_loop = abort.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    read_source_loop(source, channel, heartbeat, metrics, abort_for_loop, poll)
                })
                .await;
                finish_stage("read-source", joined, &abort, &from_source, &to_destination);
            });
        }

        {
            let from_source = self.from_source.clone();
            let to_destination = self.to_destination.clone();
            let stats = self.stats.clone();
            let status = self.status.clone();
            let mapper = self.mapper.clone();
            let control = self.control.clone();
            let abort = self.abort.clone();
            let poll = self.options.poll_interval;
            stages.spawn(async move {
                let input = from_source.clone();
                let output = to_destination.clone();
                let abort_for_loop = abort.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    process_loop(
                        input,
                        output,
                        stats,
                        status,
                        mapper,
                        control,
                        abort_for_loop,
                        poll,
                    )
                })
                .await;
                finish_stage("process", joined, &abort, &from_source, &to_destination);
            });
        }

        {
            let destination = self.destination.clone();
            let from_source = self.from_source.clone();
            let to_destination = self.to_destination.clone();
            let timeouts = timeouts.clone();
            let written = self.written.clone();
            let abort = self.abort.clone();
            let poll = self.options.poll_interval;
            stages.spawn(async move {
                let output = to_destination.clone();
                let abort_for_loop = abort.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    write_destination_loop(
                        destination,
                        output,
                        timeouts,
                        written,
                        abort_for_loop,
                        poll,
                    )
                })
                .await;
                finish_stage(
                    "write-destination",
                    joined,
                    &abort,
                    &from_source,
                    &to_destination,
                );
            });
        }

        {
            let destination = self.destination.clone();
            let from_source = self.from_source.clone();
            let to_destination = self.to_destination.clone();
            let stats = self.stats.clone();
            let status = self.status.clone();
            let abort = self.abort.clone();
            let poll = self.options.poll_interval;
            stages.spawn(async move {
                let abort_for_loop = abort.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    read_destination_acks_loop(destination, stats, status, abort_for_loop, poll)
                })
                .await;
                finish_stage(
                    "read-destination-acks",
                    joined,
                    &abort,
                    &from_source,
                    &to_destination,
                );
            });
        }

        while stages.join_next().await.is_some() {}
        done.store(true, Ordering::Release);
        while supervisors.join_next().await.is_some() {}

        match self.abort.take_cause() {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }

    fn transition_from(&self, from: PipelineState, to: PipelineState) -> anyhow::Result<()> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state != from {
            anyhow::bail!("pipeline is in state {:?}, expected {:?}", *state, from);
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: PipelineState) {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = to;
    }
}

/// Constructor-injection builder for [`ReplicationPipeline`].
#[derive(Default)]
pub struct ReplicationPipelineBuilder {
    source: Option<Arc<dyn SourceConnector>>,
    destination: Option<Arc<dyn DestinationConnector>>,
    context: Option<ReplicationContext>,
    options: ReplicationOptions,
    status_sink: Option<Arc<dyn StatusSink>>,
    metrics_sink: Option<Arc<dyn MetricsSink>>,
    mapper: Option<Arc<dyn RecordMapper>>,
    control: Option<Arc<dyn ControlForwarder>>,
}

impl ReplicationPipelineBuilder {
    pub fn source(mut self, source: Arc<dyn SourceConnector>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn destination(mut self, destination: Arc<dyn DestinationConnector>) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn context(mut self, context: ReplicationContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn options(mut self, options: ReplicationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = Some(sink);
        self
    }

    pub fn mapper(mut self, mapper: Arc<dyn RecordMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn control_forwarder(mut self, control: Arc<dyn ControlForwarder>) -> Self {
        self.control = Some(control);
        self
    }

    pub fn build(self) -> anyhow::Result<ReplicationPipeline> {
        let source = self.source.context("source connector is required")?;
        let destination = self.destination.context("destination connector is required")?;
        let context = self.context.context("replication context is required")?;
        let metrics = self
            .metrics_sink
            .unwrap_or_else(|| Arc::new(LoggingMetricsSink));
        let status_sink = self
            .status_sink
            .unwrap_or_else(|| Arc::new(LoggingStatusSink));
        let stats = Arc::new(SyncStatsTracker::new(metrics.clone()));
        let status = Arc::new(StreamStatusTracker::new(context.clone(), status_sink));

        Ok(ReplicationPipeline {
            source,
            destination,
            stats,
            status,
            metrics,
            mapper: self.mapper.unwrap_or_else(|| Arc::new(IdentityMapper)),
            control: self
                .control
                .unwrap_or_else(|| Arc::new(LoggingControlForwarder)),
            from_source: Arc::new(BoundedChannel::new(self.options.channel_capacity)),
            to_destination: Arc::new(BoundedChannel::new(self.options.channel_capacity)),
            abort: Arc::new(AbortSignal::new()),
            written: Arc::new(WrittenCounters::default()),
            state: Mutex::new(PipelineState::Init),
            context,
            options: self.options,
        })
    }
}

// ---------------------------------------------------------------------------
// Stage loops
// ---------------------------------------------------------------------------

fn read_source_loop(
    source: Arc<dyn SourceConnector>,
    from_source: Arc<BoundedChannel<Message>>,
    heartbeat: Arc<HeartbeatMonitor>,
    metrics: Arc<dyn MetricsSink>,
    abort: Arc<AbortSignal>,
    poll: Duration,
) -> Result<(), ReplicationError> {
    let result = (|| {
        loop {
            if abort.is_tripped() || from_source.is_closed() {
                return Ok(());
            }

            let check_started = Instant::now();
            let finished = source.is_finished().map_err(ReplicationError::Source)?;
            metrics.histogram(
                names::SOURCE_IS_FINISHED_SECS,
                check_started.elapsed().as_secs_f64(),
            );
            if finished {
                let exit = source.exit_value().map_err(ReplicationError::Source)?;
                if exit != 0 {
                    return Err(ReplicationError::Source(anyhow!(
                        "source exited with value {exit}"
                    )));
                }
                tracing::debug!("Source exhausted with a clean exit");
                return Ok(());
            }

            match source.attempt_read().map_err(ReplicationError::Source)? {
                Some(message) => {
                    heartbeat.beat();
                    if offer_with_backpressure(&from_source, message, &abort, poll).is_err() {
                        // Closed under us: downstream is already unwinding.
                        return Ok(());
                    }
                }
                None => std::thread::sleep(poll),
            }
        }
    })();
    from_source.close();
    result
}

#[allow(clippy::too_many_arguments)]
fn process_loop(
    from_source: Arc<BoundedChannel<Message>>,
    to_destination: Arc<BoundedChannel<Message>>,
    stats: Arc<SyncStatsTracker>,
    status: Arc<StreamStatusTracker>,
    mapper: Arc<dyn RecordMapper>,
    control: Arc<dyn ControlForwarder>,
    abort: Arc<AbortSignal>,
    poll: Duration,
) -> Result<(), ReplicationError> {
    let mut sequence = 0u64;
    let result = (|| {
        loop {
            if abort.is_tripped() {
                return Ok(());
            }
            let Some(message) = from_source.poll() else {
                if from_source.is_done() {
                    return Ok(());
                }
                std::thread::sleep(poll);
                continue;
            };

            match message {
                Message::Record(record) => {
                    let record = mapper
                        .map(record)
                        .map_err(|e| ReplicationError::Internal(e.context("record mapping failed")))?;
                    stats.record_emitted(Some(&record.stream), record.approximate_size_bytes());
                    if offer_with_backpressure(
                        &to_destination,
                        Message::Record(record),
                        &abort,
                        poll,
                    )
                    .is_err()
                    {
                        return Ok(());
                    }
                }
                Message::State(mut state) => {
                    sequence += 1;
                    let id = CheckpointId(sequence);
                    state.id = Some(id);
                    stats.checkpoint_emitted_by_source(id, &state.state);
                    if offer_with_backpressure(
                        &to_destination,
                        Message::State(state),
                        &abort,
                        poll,
                    )
                    .is_err()
                    {
                        return Ok(());
                    }
                }
                Message::Trace(trace) => match trace {
                    TraceMessage::StreamStatus(event) => status.observe(&event),
                    TraceMessage::Estimate(estimate) => stats.set_estimate(&estimate),
                    TraceMessage::Error { message } => {
                        tracing::warn!(message, "Source reported an error trace");
                    }
                    TraceMessage::Analytics { name, value } => {
                        tracing::debug!(name, value, "Source analytics trace");
                    }
                },
                Message::Control(control_message) => {
                    if let Err(error) = control.forward(control_message) {
                        tracing::warn!(error = %error, "Failed to forward control message");
                    }
                }
            }
        }
    })();
    from_source.close();
    to_destination.close();
    result
}

fn write_destination_loop(
    destination: Arc<dyn DestinationConnector>,
    to_destination: Arc<BoundedChannel<Message>>,
    timeouts: Arc<DestinationTimeoutMonitor>,
    written: Arc<WrittenCounters>,
    abort: Arc<AbortSignal>,
    poll: Duration,
) -> Result<(), ReplicationError> {
    let mut failure: Option<ReplicationError> = None;

    loop {
        if abort.is_tripped() {
            break;
        }
        let Some(message) = to_destination.poll() else {
            if to_destination.is_done() {
                break;
            }
            std::thread::sleep(poll);
            continue;
        };

        let record_size = match &message {
            Message::Record(record) => Some(record.approximate_size_bytes()),
            _ => None,
        };
        match timeouts.time(DestinationCall::Accept, || destination.accept(message)) {
            Ok(()) => {
                if let Some(size) = record_size {
                    written.records.fetch_add(1, Ordering::Relaxed);
                    written.bytes.fetch_add(size, Ordering::Relaxed);
                }
            }
            Err(error) => {
                failure = Some(ReplicationError::Destination(error));
                break;
            }
        }
    }

    // End-of-input is owed exactly once on every path out, failure included;
    // the destination flushes and finishes on this signal.
    if let Err(error) = timeouts.time(DestinationCall::NotifyEndOfInput, || {
        destination.notify_end_of_input()
    }) {
        tracing::warn!(error = %error, "Destination notify-end-of-input failed");
        if failure.is_none() {
            failure = Some(ReplicationError::Destination(error));
        }
    }

    match failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn read_destination_acks_loop(
    destination: Arc<dyn DestinationConnector>,
    stats: Arc<SyncStatsTracker>,
    status: Arc<StreamStatusTracker>,
    abort: Arc<AbortSignal>,
    poll: Duration,
) -> Result<(), ReplicationError> {
    loop {
        if abort.is_tripped() {
            return Ok(());
        }
        if destination
            .is_finished()
            .map_err(ReplicationError::Destination)?
        {
            let exit = destination
                .exit_value()
                .map_err(ReplicationError::Destination)?;
            if exit != 0 {
                return Err(ReplicationError::Destination(anyhow!(
                    "destination exited with value {exit}"
                )));
            }
            tracing::debug!("Destination finished with a clean exit");
            return Ok(());
        }

        match destination
            .attempt_read()
            .map_err(ReplicationError::Destination)?
        {
            Some(Message::State(state)) => {
                stats.checkpoint_acknowledged_by_destination(state.id, &state.state);
            }
            Some(Message::Trace(TraceMessage::StreamStatus(event))) => status.observe(&event),
            Some(Message::Trace(trace)) => {
                tracing::debug!(trace = ?trace, "Destination trace");
            }
            Some(_) => {
                tracing::debug!("Ignoring non-state message from destination");
            }
            None => std::thread::sleep(poll),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage plumbing
// ---------------------------------------------------------------------------

/// Retry an offer under backpressure. Returns `Err` when the channel closed
/// or the abort latch tripped; the message is gone either way and the caller
/// should wind down.
fn offer_with_backpressure(
    channel: &BoundedChannel<Message>,
    mut message: Message,
    abort: &AbortSignal,
    poll: Duration,
) -> Result<(), ()> {
    loop {
        match channel.offer(message) {
            Ok(()) => return Ok(()),
            Err(OfferError::Closed(_)) => return Err(()),
            Err(OfferError::Full(returned)) => {
                if abort.is_tripped() {
                    return Err(());
                }
                message = returned;
                std::thread::sleep(poll);
            }
        }
    }
}

fn finish_stage(
    stage: &'static str,
    joined: Result<Result<(), ReplicationError>, tokio::task::JoinError>,
    abort: &AbortSignal,
    from_source: &BoundedChannel<Message>,
    to_destination: &BoundedChannel<Message>,
) {
    let result = joined.unwrap_or_else(|join_error| {
        Err(ReplicationError::Internal(anyhow!(
            "{stage} stage panicked: {join_error}"
        )))
    });
    match result {
        Ok(()) => tracing::debug!(stage, "Stage completed"),
        Err(error) => {
            tracing::error!(stage, error = %error, "Stage failed; unwinding pipeline");
            abort.trip(error);
            from_source.close();
            to_destination.close();
        }
    }
}

/// Watches the abort latch: on a trip it closes both channels, and for
/// supervisor-raised causes also cancels the stuck connector so a blocking
/// call cannot hold the pipeline open past its deadline.
async fn unwind_watcher(
    abort: Arc<AbortSignal>,
    from_source: Arc<BoundedChannel<Message>>,
    to_destination: Arc<BoundedChannel<Message>>,
    source: Arc<dyn SourceConnector>,
    destination: Arc<dyn DestinationConnector>,
    done: Arc<AtomicBool>,
    poll: Duration,
) {
    while !done.load(Ordering::Acquire) && !abort.is_tripped() {
        tokio::time::sleep(poll).await;
    }
    if !abort.is_tripped() {
        return;
    }

    from_source.close();
    to_destination.close();

    let (cancel_source, cancel_destination) = abort.with_cause(|cause| match cause {
        Some(ReplicationError::SourceHeartbeatTimeout { .. }) => (true, false),
        Some(
            ReplicationError::DestinationAcceptTimeout { .. }
            | ReplicationError::DestinationNotifyEndOfInputTimeout { .. },
        ) => (false, true),
        _ => (false, false),
    });

    if cancel_source {
        let source = source.clone();
        let join = tokio::task::spawn_blocking(move || source.cancel()).await;
        if let Ok(Err(error)) = join {
            tracing::warn!(error = %error, "Source cancel after heartbeat timeout failed");
        }
    }
    if cancel_destination {
        let destination = destination.clone();
        let join = tokio::task::spawn_blocking(move || destination.cancel()).await;
        if let Ok(Err(error)) = join {
            tracing::warn!(error = %error, "Destination cancel after stage timeout failed");
        }
    }
}

#[derive(Default)]
struct ReporterSnapshot {
    records_read: u64,
    bytes_read: u64,
    records_written: u64,
    bytes_written: u64,
}

/// Periodic metrics reporter: queue-depth gauges plus counter deltas for
/// records/bytes moved since the previous report. Emits a final snapshot on
/// the way out so short syncs still report.
#[allow(clippy::too_many_arguments)]
async fn report_metrics_loop(
    stats: Arc<SyncStatsTracker>,
    written: Arc<WrittenCounters>,
    from_source: Arc<BoundedChannel<Message>>,
    to_destination: Arc<BoundedChannel<Message>>,
    metrics: Arc<dyn MetricsSink>,
    done: Arc<AtomicBool>,
    tick: Duration,
    interval: Duration,
) {
    let mut snapshot = ReporterSnapshot::default();
    let mut since_last = Duration::ZERO;
    while !done.load(Ordering::Acquire) {
        tokio::time::sleep(tick).await;
        since_last += tick;
        if since_last >= interval {
            since_last = Duration::ZERO;
            emit_periodic_metrics(
                &stats,
                &written,
                &from_source,
                &to_destination,
                metrics.as_ref(),
                &mut snapshot,
            );
        }
    }
    emit_periodic_metrics(
        &stats,
        &written,
        &from_source,
        &to_destination,
        metrics.as_ref(),
        &mut snapshot,
    );
}

fn emit_periodic_metrics(
    stats: &SyncStatsTracker,
    written: &WrittenCounters,
    from_source: &BoundedChannel<Message>,
    to_destination: &BoundedChannel<Message>,
    metrics: &dyn MetricsSink,
    snapshot: &mut ReporterSnapshot,
) {
    metrics.gauge(names::FROM_SOURCE_QUEUE_DEPTH, from_source.len() as f64);
    metrics.gauge(names::TO_DESTINATION_QUEUE_DEPTH, to_destination.len() as f64);

    let totals = stats.totals(false);
    let records_written = written.records.load(Ordering::Relaxed);
    let bytes_written = written.bytes.load(Ordering::Relaxed);

    metrics.counter(
        names::RECORDS_READ_FROM_SOURCE,
        totals.records_emitted.saturating_sub(snapshot.records_read),
    );
    metrics.counter(
        names::BYTES_READ_FROM_SOURCE,
        totals.bytes_emitted.saturating_sub(snapshot.bytes_read),
    );
    metrics.counter(
        names::RECORDS_WRITTEN_TO_DESTINATION,
        records_written.saturating_sub(snapshot.records_written),
    );
    metrics.counter(
        names::BYTES_WRITTEN_TO_DESTINATION,
        bytes_written.saturating_sub(snapshot.bytes_written),
    );

    snapshot.records_read = totals.records_emitted;
    snapshot.bytes_read = totals.bytes_emitted;
    snapshot.records_written = records_written;
    snapshot.bytes_written = bytes_written;
}

fn close_quietly(name: &'static str, close: impl FnOnce() -> anyhow::Result<()>) {
    if let Err(error) = close() {
        tracing::warn!(connector = name, error = %error, "Close failed during unwind");
    }
}
