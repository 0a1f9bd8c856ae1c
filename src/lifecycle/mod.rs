//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (orchestrator.rs):
//!     Start processors (registry.rs) → fail-fast gate → spawn listener → Running
//!
//! Shutdown (orchestrator.rs):
//!     Shutdown event (shutdown.rs) → stop processors → wait on barrier (barrier.rs)
//!     → listener shutdown within deadline → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - Ordered startup: processors first, listener last
//! - Ordered shutdown: processors drain fully, then the listener
//! - Only the listener shutdown has a deadline

pub mod barrier;
pub mod orchestrator;
pub mod processor;
pub mod registry;
pub mod shutdown;
pub mod signals;

pub use barrier::DrainBarrier;
pub use orchestrator::{LifecycleError, Orchestrator};
pub use processor::{FnProcessor, Processor, ProcessorError};
pub use registry::{ProcessorFailure, ProcessorRegistry};
pub use shutdown::Shutdown;

/// Orchestrator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Constructed, `run` not yet called.
    Created,
    /// Processors started, listener serving, waiting for shutdown.
    Running,
    /// Shutdown requested, processors stopping.
    Draining,
    /// Terminal.
    Stopped,
}
