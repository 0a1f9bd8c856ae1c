//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT; Ctrl-C off unix)
//! - Translate the first signal into a [`Shutdown`] trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered before this returns, so a signal that arrives right after
//!   startup is not lost
//! - A second signal is harmless: the shutdown event is single-fire

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

impl Shutdown {
    /// A shutdown event that fires on SIGINT or SIGTERM.
    pub fn with_os_signals() -> std::io::Result<Self> {
        let shutdown = Shutdown::new();
        cancel_on_signal(shutdown.clone())?;
        Ok(shutdown)
    }
}

/// Trigger `shutdown` when the process receives an interrupt or terminate signal.
///
/// The returned task also exits once `shutdown` fires for any other reason.
#[cfg(unix)]
pub fn cancel_on_signal(shutdown: Shutdown) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        let received = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
            _ = shutdown.triggered() => return,
        };
        tracing::info!(signal = received, "System signal received");
        shutdown.trigger();
    }))
}

#[cfg(not(unix))]
pub fn cancel_on_signal(shutdown: Shutdown) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
            }
            _ = shutdown.triggered() => return,
        }
        tracing::info!(signal = "Ctrl+C", "System signal received");
        shutdown.trigger();
    }))
}
