//! Service lifecycle orchestration.
//!
//! Runs an HTTP listener together with any number of background processors: processors start
//! first, the listener serves until a shutdown event, processors drain, and the listener is
//! shut down within a deadline.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::{Config, Options};
pub use lifecycle::{
    DrainBarrier, LifecycleError, Orchestrator, Processor, ProcessorError, Shutdown, State,
};
