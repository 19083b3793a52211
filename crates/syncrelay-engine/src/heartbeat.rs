//! Liveness supervisor for the source side.
//!
//! The read-source stage touches the monitor on every non-empty read; a
//! background loop compares the gap since the last touch against the
//! configured silence window. A stalled source otherwise hangs the whole
//! pipeline silently, with both channels drained and every stage politely
//! sleeping.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use syncrelay_types::metric::names;
use syncrelay_types::ReplicationError;

use crate::abort::AbortSignal;
use crate::config::HeartbeatOptions;
use crate::metrics::MetricsSink;

/// Tracks the time since the source last produced a record.
pub struct HeartbeatMonitor {
    epoch: Instant,
    last_beat_millis: AtomicU64,
    options: HeartbeatOptions,
}

impl HeartbeatMonitor {
    pub fn new(options: HeartbeatOptions) -> Self {
        Self {
            epoch: Instant::now(),
            last_beat_millis: AtomicU64::new(0),
            options,
        }
    }

    /// Record source activity. Called by the read-source stage on every
    /// non-empty read.
    pub fn beat(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_beat_millis.store(now, Ordering::Relaxed);
    }

    /// Time since the last observed beat (or since monitor creation, before
    /// the first beat).
    pub fn silence(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        let last = self.last_beat_millis.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }

    /// Supervisor loop. Runs until the pipeline finishes (`done`), the abort
    /// latch trips elsewhere, or this monitor escalates a silence overrun.
    ///
    /// In observe-only mode (`fail_on_silence = false`) an overrun is metered
    /// once per silence episode and the loop keeps watching.
    pub async fn watch(
        self: Arc<Self>,
        abort: Arc<AbortSignal>,
        metrics: Arc<dyn MetricsSink>,
        done: Arc<AtomicBool>,
    ) {
        let mut episode_metered = false;
        while !done.load(Ordering::Acquire) && !abort.is_tripped() {
            tokio::time::sleep(self.options.poll_interval).await;

            let silence = self.silence();
            if silence <= self.options.max_silence {
                episode_metered = false;
                continue;
            }

            if !episode_metered {
                episode_metered = true;
                metrics.counter(names::SOURCE_HEARTBEAT_FAILURE, 1);
                tracing::warn!(
                    silence_secs = silence.as_secs_f64(),
                    max_silence_secs = self.options.max_silence.as_secs_f64(),
                    fatal = self.options.fail_on_silence,
                    "No records from source within the silence window"
                );
            }

            if self.options.fail_on_silence {
                abort.trip(ReplicationError::SourceHeartbeatTimeout { silence });
                return;
            }
        }
    }
}
