//! Closeable bounded FIFO channel, the backpressure primitive between stages.
//!
//! A full channel stalls its producer, which stalls the upstream producer
//! transitively; a closed-and-drained channel is the "fully done" signal a
//! consumer must observe before exiting. All operations are non-blocking:
//! producers retry [`BoundedChannel::offer`] in a bounded sleep-and-retry
//! loop that also checks the shared abort flag, so no stage ever parks on
//! the channel itself.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Why an offer was rejected. The item is handed back so the producer can
/// retry without cloning.
#[derive(Debug, PartialEq)]
pub enum OfferError<T> {
    /// Channel is at capacity; retry after a short sleep.
    Full(T),
    /// Channel is closed; the item can never be delivered.
    Closed(T),
}

struct ChannelState<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity, closeable FIFO queue.
pub struct BoundedChannel<T> {
    state: Mutex<ChannelState<T>>,
    capacity: usize,
}

impl<T> BoundedChannel<T> {
    /// Create a channel with the given capacity. Capacity is clamped to at
    /// least 1; a capacity-1 channel degenerates to direct handoff.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(ChannelState {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
        }
    }

    /// Non-blocking enqueue. FIFO order is preserved exactly.
    pub fn offer(&self, item: T) -> Result<(), OfferError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(OfferError::Closed(item));
        }
        if state.queue.len() >= self.capacity {
            return Err(OfferError::Full(item));
        }
        state.queue.push_back(item);
        Ok(())
    }

    /// Non-blocking dequeue.
    pub fn poll(&self) -> Option<T> {
        self.lock().queue.pop_front()
    }

    /// Close the channel. Idempotent; items already queued remain pollable.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Closed AND empty: nothing in flight, nothing will ever arrive.
    pub fn is_done(&self) -> bool {
        let state = self.lock();
        state.closed && state.queue.is_empty()
    }

    /// Current occupancy, for the queue-depth gauge.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelState<T>> {
        // A poisoned channel mutex means a stage panicked mid-push/pop; the
        // queue itself is still structurally sound, so keep serving it and
        // let the pipeline surface the panic through the stage join.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
