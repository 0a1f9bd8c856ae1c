//! Ordered set of attached processors.
//!
//! # Design Decisions
//! - Append-only, no deduplication: a processor registered twice runs twice
//! - Batches run sequentially in registration order; side effects are ordered
//! - A failure never short-circuits the batch; every failure is collected

use std::sync::Arc;

use crate::lifecycle::processor::{Processor, ProcessorError};
use crate::lifecycle::{DrainBarrier, Shutdown};

/// One failing processor in a start or stop batch.
#[derive(Debug, thiserror::Error)]
#[error("processor #{index} ({processor}): {source}")]
pub struct ProcessorFailure {
    /// Registration index of the processor.
    pub index: usize,
    /// Processor name at the time of failure.
    pub processor: String,
    #[source]
    pub source: ProcessorError,
}

/// Registered processors, in registration order.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        tracing::debug!(
            processor = processor.name(),
            index = self.processors.len(),
            "Processor registered"
        );
        self.processors.push(processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Start every processor in order and return the failures, in order.
    pub async fn start_all(&self, shutdown: &Shutdown) -> Vec<ProcessorFailure> {
        let mut failures = Vec::new();
        for (index, processor) in self.processors.iter().enumerate() {
            if let Err(source) = processor.start(shutdown).await {
                tracing::error!(
                    processor = processor.name(),
                    index,
                    error = %source,
                    "Unable to start processor"
                );
                failures.push(ProcessorFailure {
                    index,
                    processor: processor.name().to_string(),
                    source,
                });
            }
        }
        failures
    }

    /// Ask every processor to stop, in order, and return the failures, in order.
    ///
    /// One barrier slot is acquired per processor right before its `stop` is called. Waiting
    /// for the barrier is left to the caller.
    pub async fn stop_all(&self, barrier: &DrainBarrier) -> Vec<ProcessorFailure> {
        let mut failures = Vec::new();
        for (index, processor) in self.processors.iter().enumerate() {
            barrier.add();
            if let Err(source) = processor.stop(barrier).await {
                tracing::error!(
                    processor = processor.name(),
                    index,
                    error = %source,
                    "Unable to stop processor"
                );
                failures.push(ProcessorFailure {
                    index,
                    processor: processor.name().to_string(),
                    source,
                });
            }
        }
        failures
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.processors.iter().map(|p| p.name()))
            .finish()
    }
}
