//! Counting barrier used to drain processors.

use std::sync::Arc;
use tokio::sync::watch;

/// Counts outstanding processor stops and lets the orchestrator wait for all of them.
///
/// One slot is acquired with [`add`](DrainBarrier::add) before a processor is asked to stop;
/// the processor releases it with [`done`](DrainBarrier::done) exactly once, whether its stop
/// succeeded or not. A slot that is never released blocks [`wait`](DrainBarrier::wait) forever.
///
/// Clones share the same counter, so a processor may move a clone into a background task and
/// release its slot from there.
#[derive(Debug, Clone)]
pub struct DrainBarrier {
    pending: Arc<watch::Sender<usize>>,
}

impl DrainBarrier {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            pending: Arc::new(tx),
        }
    }

    /// Acquire one slot.
    pub fn add(&self) {
        self.pending.send_modify(|n| *n += 1);
    }

    /// Release one slot.
    ///
    /// Releasing more slots than were acquired leaves the count at zero.
    pub fn done(&self) {
        let mut overflow = false;
        self.pending.send_modify(|n| match n.checked_sub(1) {
            Some(left) => *n = left,
            None => overflow = true,
        });
        if overflow {
            tracing::warn!("Drain barrier released more times than it was acquired");
        }
    }

    /// Slots still held.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until every acquired slot has been released.
    pub async fn wait(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for DrainBarrier {
    fn default() -> Self {
        Self::new()
    }
}
