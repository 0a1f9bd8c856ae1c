//! Connection identity and per-connection activity tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track in-flight requests on a connection
//! - Detect when a keep-alive connection has sat idle too long

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub(crate) fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is open and serving requests.
    Active,
    /// Connection was asked to close after its in-flight request.
    Draining,
    /// Connection is closed.
    Closed,
}

/// Counts requests in flight on one connection.
#[derive(Debug, Clone)]
pub struct Activity {
    in_flight: Arc<watch::Sender<usize>>,
}

impl Activity {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            in_flight: Arc::new(tx),
        }
    }

    /// Mark a request as started. The request counts as in flight until the guard drops.
    pub fn begin(&self) -> InFlight {
        self.in_flight.send_modify(|n| *n += 1);
        InFlight {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Resolve once the connection has had no request in flight for `idle`.
    ///
    /// The clock restarts whenever a request starts.
    pub async fn idle_for(&self, idle: Duration) {
        let mut rx = self.in_flight.subscribe();
        loop {
            let _ = rx.wait_for(|n| *n == 0).await;
            if tokio::time::timeout(idle, rx.changed()).await.is_err() {
                return;
            }
        }
    }
}

/// Guard for one in-flight request.
#[derive(Debug)]
pub struct InFlight {
    in_flight: Arc<watch::Sender<usize>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Guard that keeps the active-connection gauge honest.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn open(id: ConnectionId) -> Self {
        metrics::connection_opened();
        Self { id }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::connection_closed();
        tracing::trace!(connection = %self.id, "Connection closed");
    }
}
