//! Shutdown coordination for the service.

use tokio_util::sync::CancellationToken;

/// Single-fire shutdown event.
///
/// Clones share the same event. The first [`trigger`](Shutdown::trigger) fires it; every later
/// trigger, from any clone, is a no-op. Waiters that subscribe after the event fired return
/// immediately.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new, untriggered shutdown event.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Fire the shutdown event.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether the event has fired.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the event fires.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// The underlying token, for handing to code that speaks `tokio_util` directly.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_waiters_on_clones() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();

        let handle = tokio::spawn(async move {
            waiter.triggered().await;
        });

        assert!(!shutdown.is_triggered());
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_repeated_triggers_collapse() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.clone().trigger();
        shutdown.trigger();

        assert!(shutdown.is_triggered());
        // Late waiters see the event without blocking.
        tokio::time::timeout(Duration::from_millis(100), shutdown.triggered())
            .await
            .expect("already triggered");
    }

    #[tokio::test]
    async fn test_token_shares_state() {
        let shutdown = Shutdown::new();
        let token = shutdown.token();
        token.cancel();
        assert!(shutdown.is_triggered());
    }
}
