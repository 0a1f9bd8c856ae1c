//! Background processors attached to the service.

use async_trait::async_trait;

use crate::lifecycle::{DrainBarrier, Shutdown};

/// Error returned by a processor's `start` or `stop`.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("{0}")]
    Message(String),
    #[error("processor operation is not implemented")]
    Unimplemented,
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProcessorError {
    pub fn msg(message: impl Into<String>) -> Self {
        ProcessorError::Message(message.into())
    }
}

/// A unit of background work whose lifetime follows the service.
///
/// `start` is called once, in registration order, before the listener comes up. `stop` is
/// called once, in registration order, after shutdown has been requested.
///
/// # Stop contract
/// Before `stop` is called one slot of `barrier` has been acquired on the processor's behalf.
/// The implementation must call [`DrainBarrier::done`] exactly once, on success and on failure
/// alike, either before returning or later from a task holding a clone of the barrier. The
/// service does not shut its listener down until every slot has been released.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Name used in log lines and failure reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn start(&self, shutdown: &Shutdown) -> Result<(), ProcessorError>;

    async fn stop(&self, barrier: &DrainBarrier) -> Result<(), ProcessorError>;
}

/// A processor built from a pair of synchronous closures.
///
/// The barrier slot is released after the stop closure runs, whatever it returns.
pub struct FnProcessor<S, T> {
    name: String,
    start_fn: S,
    stop_fn: T,
}

impl<S, T> FnProcessor<S, T>
where
    S: Fn() -> Result<(), ProcessorError> + Send + Sync,
    T: Fn() -> Result<(), ProcessorError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, start_fn: S, stop_fn: T) -> Self {
        Self {
            name: name.into(),
            start_fn,
            stop_fn,
        }
    }
}

impl<S, T> std::fmt::Debug for FnProcessor<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProcessor").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<S, T> Processor for FnProcessor<S, T>
where
    S: Fn() -> Result<(), ProcessorError> + Send + Sync,
    T: Fn() -> Result<(), ProcessorError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _shutdown: &Shutdown) -> Result<(), ProcessorError> {
        (self.start_fn)()
    }

    async fn stop(&self, barrier: &DrainBarrier) -> Result<(), ProcessorError> {
        let result = (self.stop_fn)();
        barrier.done();
        result
    }
}
