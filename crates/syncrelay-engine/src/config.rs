//! Runtime options for a pipeline run.
//!
//! None of this is a user-facing configuration surface; callers construct
//! options programmatically. Defaults match a healthy production sync; tests
//! shrink the intervals to keep wall-clock time down.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default buffer capacity between stages, in messages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_000;
/// Default sleep between polls in stage retry loops.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Default cadence of the periodic metrics reporter.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(10);
/// Default maximum silence from the source before the heartbeat trips.
pub const DEFAULT_MAX_SILENCE: Duration = Duration::from_secs(300);
/// Default heartbeat/timeout supervisor poll cadence.
pub const DEFAULT_SUPERVISOR_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default deadline for a single destination `accept` call.
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(300);
/// Default deadline for the destination `notify_end_of_input` call.
pub const DEFAULT_NOTIFY_END_OF_INPUT_TIMEOUT: Duration = Duration::from_secs(900);

/// Liveness supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatOptions {
    /// Longest tolerated gap between records observed from the source.
    pub max_silence: Duration,
    /// How often the supervisor re-checks the gap.
    pub poll_interval: Duration,
    /// When false the supervisor runs observe-only: overruns are metered but
    /// never abort the sync.
    pub fail_on_silence: bool,
}

impl Default for HeartbeatOptions {
    fn default() -> Self {
        Self {
            max_silence: DEFAULT_MAX_SILENCE,
            poll_interval: DEFAULT_SUPERVISOR_POLL_INTERVAL,
            fail_on_silence: true,
        }
    }
}

/// Stage timeout supervisor configuration for destination calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationTimeoutOptions {
    pub accept_timeout: Duration,
    pub notify_end_of_input_timeout: Duration,
    pub poll_interval: Duration,
    /// When false, overruns are metered and the call is left to run to its
    /// own completion or failure.
    pub fail_on_timeout: bool,
}

impl Default for DestinationTimeoutOptions {
    fn default() -> Self {
        Self {
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            notify_end_of_input_timeout: DEFAULT_NOTIFY_END_OF_INPUT_TIMEOUT,
            poll_interval: DEFAULT_SUPERVISOR_POLL_INTERVAL,
            fail_on_timeout: false,
        }
    }
}

/// Options for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationOptions {
    /// Capacity of each inter-stage buffer. A value of 1 degenerates to the
    /// unbuffered direct-handoff variant.
    pub channel_capacity: usize,
    pub poll_interval: Duration,
    pub metrics_interval: Duration,
    pub heartbeat: HeartbeatOptions,
    pub destination_timeouts: DestinationTimeoutOptions,
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            metrics_interval: DEFAULT_METRICS_INTERVAL,
            heartbeat: HeartbeatOptions::default(),
            destination_timeouts: DestinationTimeoutOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_buffered_and_heartbeat_fatal() {
        let opts = ReplicationOptions::default();
        assert_eq!(opts.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(opts.heartbeat.fail_on_silence);
        assert!(!opts.destination_timeouts.fail_on_timeout);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let opts: ReplicationOptions = serde_json::from_str(r#"{"channel_capacity": 4}"#).unwrap();
        assert_eq!(opts.channel_capacity, 4);
        assert_eq!(opts.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(opts.heartbeat, HeartbeatOptions::default());
    }
}
