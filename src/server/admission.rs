//! Bounded concurrency with a bounded FIFO queue.
//!
//! Each endpoint family gets its own [`ConcurrencyGate`]; saturation of
//! one never blocks the other. Admission:
//!
//! 1. A free slot admits immediately.
//! 2. Otherwise the request enqueues (bounded) and waits up to the
//!    queue timeout.
//! 3. A full queue rejects with `server_busy`.
//! 4. A waiter woken after its timer expired is rejected with
//!    `queue_timeout` and never consumes a slot.
//! 5. Releasing a slot admits the head of the queue (FIFO).
//!
//! The slot travels inside a [`SlotGuard`] whose drop releases exactly
//! once, so every terminal code path (success, error, timeout, client
//! disconnect) returns the slot.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Outcome of [`ConcurrencyGate::admit`].
pub enum Admission {
    Admitted(SlotGuard),
    /// Slots and queue both full.
    Busy,
    /// Queued, but no slot freed within the queue timeout.
    QueueTimeout,
}

struct GateState {
    active: usize,
    queue: VecDeque<(u64, oneshot::Sender<SlotGuard>)>,
}

struct GateShared {
    max_concurrent: usize,
    max_queue: usize,
    queue_timeout: Duration,
    state: Mutex<GateState>,
    next_waiter: AtomicU64,
}

impl GateShared {
    /// Hand the freed slot to the first live waiter, else decrement.
    fn release(self: &Arc<Self>) {
        let mut state = self.state.lock();
        while let Some((_, tx)) = state.queue.pop_front() {
            let guard = SlotGuard {
                gate: Arc::clone(self),
                armed: true,
            };
            match tx.send(guard) {
                Ok(()) => return,
                // Receiver timed out or disconnected; disarm the
                // returned guard so its drop does not re-enter release.
                Err(mut unsent) => {
                    unsent.armed = false;
                    continue;
                }
            }
        }
        state.active -= 1;
    }
}

/// Owns one concurrency slot; released exactly once on drop.
pub struct SlotGuard {
    gate: Arc<GateShared>,
    armed: bool,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            self.gate.release();
        }
    }
}

/// A bounded concurrency limiter with a bounded FIFO wait queue.
pub struct ConcurrencyGate {
    shared: Arc<GateShared>,
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize, max_queue: usize, queue_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(GateShared {
                max_concurrent,
                max_queue,
                queue_timeout,
                state: Mutex::new(GateState {
                    active: 0,
                    queue: VecDeque::new(),
                }),
                next_waiter: AtomicU64::new(0),
            }),
        }
    }

    pub async fn admit(&self) -> Admission {
        let (waiter_id, rx) = {
            let mut state = self.shared.state.lock();
            if state.active < self.shared.max_concurrent {
                state.active += 1;
                return Admission::Admitted(SlotGuard {
                    gate: Arc::clone(&self.shared),
                    armed: true,
                });
            }
            if state.queue.len() >= self.shared.max_queue {
                return Admission::Busy;
            }
            let id = self.shared.next_waiter.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            state.queue.push_back((id, tx));
            (id, rx)
        };

        match tokio::time::timeout(self.shared.queue_timeout, rx).await {
            Ok(Ok(guard)) => Admission::Admitted(guard),
            // Sender dropped without sending: gate torn down.
            Ok(Err(_)) => Admission::Busy,
            Err(_elapsed) => {
                // Remove our entry so a later release cannot wake us; a
                // guard already in flight is dropped by the closed
                // receiver and re-released there.
                let mut state = self.shared.state.lock();
                state.queue.retain(|(id, _)| *id != waiter_id);
                Admission::QueueTimeout
            }
        }
    }

    #[cfg(test)]
    fn active(&self) -> usize {
        self.shared.state.lock().active
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }
}
