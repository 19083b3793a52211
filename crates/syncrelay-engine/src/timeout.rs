//! Stage timeout supervisor for destination calls.
//!
//! `accept` and `notify_end_of_input` are blocking calls into an external
//! collaborator and cannot be interrupted from here; the supervisor watches
//! them from outside. An overrun is always metered; it becomes fatal only
//! when the workspace opts in via `fail_on_timeout`, otherwise the call is
//! left to finish or fail on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use syncrelay_types::metric::names;
use syncrelay_types::ReplicationError;

use crate::abort::AbortSignal;
use crate::config::DestinationTimeoutOptions;
use crate::metrics::MetricsSink;

/// Which destination call is being timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationCall {
    Accept,
    NotifyEndOfInput,
}

struct InFlight {
    call: DestinationCall,
    started: Instant,
    metered: bool,
}

/// Watches the currently in-flight destination call, if any.
pub struct DestinationTimeoutMonitor {
    in_flight: Mutex<Option<InFlight>>,
    options: DestinationTimeoutOptions,
}

impl DestinationTimeoutMonitor {
    pub fn new(options: DestinationTimeoutOptions) -> Self {
        Self {
            in_flight: Mutex::new(None),
            options,
        }
    }

    /// Run `f` with the supervisor watching. The timer starts when the call
    /// begins and is cleared when it returns, panic included.
    pub fn time<R>(&self, call: DestinationCall, f: impl FnOnce() -> R) -> R {
        let _guard = self.begin(call);
        f()
    }

    fn begin(&self, call: DestinationCall) -> CallGuard<'_> {
        *self.lock() = Some(InFlight {
            call,
            started: Instant::now(),
            metered: false,
        });
        CallGuard { monitor: self }
    }

    fn deadline(&self, call: DestinationCall) -> Duration {
        match call {
            DestinationCall::Accept => self.options.accept_timeout,
            DestinationCall::NotifyEndOfInput => self.options.notify_end_of_input_timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<InFlight>> {
        self.in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Supervisor loop. Runs until the pipeline finishes (`done`), the abort
    /// latch trips elsewhere, or this monitor escalates an overrun.
    pub async fn watch(
        self: Arc<Self>,
        abort: Arc<AbortSignal>,
        metrics: Arc<dyn MetricsSink>,
        done: Arc<AtomicBool>,
    ) {
        while !done.load(Ordering::Acquire) && !abort.is_tripped() {
            tokio::time::sleep(self.options.poll_interval).await;

            let overrun = {
                let mut in_flight = self.lock();
                match in_flight.as_mut() {
                    Some(call) if call.started.elapsed() > self.deadline(call.call) => {
                        let first_observation = !call.metered;
                        call.metered = true;
                        Some((call.call, call.started.elapsed(), first_observation))
                    }
                    _ => None,
                }
            };

            let Some((call, elapsed, first_observation)) = overrun else {
                continue;
            };

            if first_observation {
                let name = match call {
                    DestinationCall::Accept => names::DESTINATION_ACCEPT_TIMEOUT,
                    DestinationCall::NotifyEndOfInput => {
                        names::DESTINATION_NOTIFY_END_OF_INPUT_TIMEOUT
                    }
                };
                metrics.counter(name, 1);
                tracing::warn!(
                    call = ?call,
                    elapsed_secs = elapsed.as_secs_f64(),
                    fatal = self.options.fail_on_timeout,
                    "Destination call exceeded its deadline"
                );
            }

            if self.options.fail_on_timeout {
                let error = match call {
                    DestinationCall::Accept => {
                        ReplicationError::DestinationAcceptTimeout { elapsed }
                    }
                    DestinationCall::NotifyEndOfInput => {
                        ReplicationError::DestinationNotifyEndOfInputTimeout { elapsed }
                    }
                };
                abort.trip(error);
                return;
            }
        }
    }
}

struct CallGuard<'a> {
    monitor: &'a DestinationTimeoutMonitor,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        *self.monitor.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingMetricsSink;

    fn options(accept_ms: u64, fatal: bool) -> DestinationTimeoutOptions {
        DestinationTimeoutOptions {
            accept_timeout: Duration::from_millis(accept_ms),
            notify_end_of_input_timeout: Duration::from_millis(accept_ms),
            poll_interval: Duration::from_millis(5),
            fail_on_timeout: fatal,
        }
    }

    #[test]
    fn timer_clears_when_the_call_returns() {
        let monitor = DestinationTimeoutMonitor::new(options(1_000, false));
        let out = monitor.time(DestinationCall::Accept, || 7);
        assert_eq!(out, 7);
        assert!(monitor.lock().is_none());
    }

    #[tokio::test]
    async fn slow_accept_is_metered_once_but_not_fatal_by_default() {
        let monitor = Arc::new(DestinationTimeoutMonitor::new(options(10, false)));
        let abort = Arc::new(AbortSignal::new());
        let metrics = Arc::new(RecordingMetricsSink::new());
        let done = Arc::new(AtomicBool::new(false));

        let watcher = tokio::spawn(
            monitor
                .clone()
                .watch(abort.clone(), metrics.clone(), done.clone()),
        );
        let call = tokio::task::spawn_blocking(move || {
            monitor.time(DestinationCall::Accept, || {
                std::thread::sleep(Duration::from_millis(60));
            });
        });
        call.await.unwrap();
        done.store(true, Ordering::Release);
        watcher.await.unwrap();

        assert!(!abort.is_tripped());
        assert_eq!(metrics.counter_total(names::DESTINATION_ACCEPT_TIMEOUT), 1);
    }

    #[tokio::test]
    async fn slow_accept_trips_the_abort_when_escalation_is_enabled() {
        let monitor = Arc::new(DestinationTimeoutMonitor::new(options(10, true)));
        let abort = Arc::new(AbortSignal::new());
        let metrics = Arc::new(RecordingMetricsSink::new());
        let done = Arc::new(AtomicBool::new(false));

        let watcher = tokio::spawn(
            monitor
                .clone()
                .watch(abort.clone(), metrics.clone(), done.clone()),
        );
        let call = tokio::task::spawn_blocking(move || {
            monitor.time(DestinationCall::Accept, || {
                std::thread::sleep(Duration::from_millis(60));
            });
        });
        call.await.unwrap();
        watcher.await.unwrap();

        assert!(matches!(
            abort.take_cause(),
            Some(ReplicationError::DestinationAcceptTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn end_of_input_overrun_uses_its_own_deadline_and_counter() {
        let monitor = Arc::new(DestinationTimeoutMonitor::new(DestinationTimeoutOptions {
            accept_timeout: Duration::from_secs(60),
            notify_end_of_input_timeout: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
            fail_on_timeout: false,
        }));
        let abort = Arc::new(AbortSignal::new());
        let metrics = Arc::new(RecordingMetricsSink::new());
        let done = Arc::new(AtomicBool::new(false));

        let watcher = tokio::spawn(
            monitor
                .clone()
                .watch(abort.clone(), metrics.clone(), done.clone()),
        );
        let call = tokio::task::spawn_blocking(move || {
            monitor.time(DestinationCall::NotifyEndOfInput, || {
                std::thread::sleep(Duration::from_millis(40));
            });
        });
        call.await.unwrap();
        done.store(true, Ordering::Release);
        watcher.await.unwrap();

        assert_eq!(
            metrics.counter_total(names::DESTINATION_NOTIFY_END_OF_INPUT_TIMEOUT),
            1
        );
        assert_eq!(metrics.counter_total(names::DESTINATION_ACCEPT_TIMEOUT), 0);
    }
}
