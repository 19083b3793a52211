//! Shared first-failure latch for the pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use syncrelay_types::ReplicationError;

/// Abort flag every stage and supervisor checks in its retry loop.
///
/// The first trip wins and records its cause; later trips flip nothing and
/// are logged at debug, since a failing stage routinely drags its neighbours
/// into failing too.
#[derive(Debug, Default)]
pub struct AbortSignal {
    tripped: AtomicBool,
    cause: Mutex<Option<ReplicationError>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the latch. Returns true when this call recorded the cause.
    pub fn trip(&self, error: ReplicationError) -> bool {
        let mut cause = self
            .cause
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if cause.is_some() {
            tracing::debug!(error = %error, "Abort already tripped, dropping secondary cause");
            return false;
        }
        *cause = Some(error);
        self.tripped.store(true, Ordering::Release);
        true
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Inspect the recorded cause without taking it.
    pub fn with_cause<R>(&self, f: impl FnOnce(Option<&ReplicationError>) -> R) -> R {
        let cause = self
            .cause
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(cause.as_ref())
    }

    /// Take the recorded cause, leaving the latch tripped.
    pub fn take_cause(&self) -> Option<ReplicationError> {
        self.cause
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_trip_wins() {
        let abort = AbortSignal::new();
        assert!(!abort.is_tripped());
        assert!(abort.trip(ReplicationError::Cancelled));
        assert!(!abort.trip(ReplicationError::Source(anyhow::anyhow!("late"))));
        assert!(abort.is_tripped());
        assert!(matches!(
            abort.take_cause(),
            Some(ReplicationError::Cancelled)
        ));
    }

    #[test]
    fn taking_the_cause_leaves_the_latch_tripped() {
        let abort = AbortSignal::new();
        abort.trip(ReplicationError::Cancelled);
        assert!(abort.take_cause().is_some());
        assert!(abort.take_cause().is_none());
        assert!(abort.is_tripped());
    }
}
