//! Service startup and deadline-bound shutdown.
//!
//! # Responsibilities
//! - Start attached processors, then the listener
//! - Wait for the shutdown event
//! - Drain processors, then shut the listener down within the configured deadline
//!
//! # Design Decisions
//! - Processors start before the listener: traffic only once background work is up
//! - The listener runs on its own task; a listener failure fires the shutdown event
//! - Signal wait and processor drain are unbounded; only the listener shutdown has a deadline

use axum::Router;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::http::server::{HttpServer, ServerHandle, ServerTimeouts};
use crate::lifecycle::processor::Processor;
use crate::lifecycle::registry::{ProcessorFailure, ProcessorRegistry};
use crate::lifecycle::{DrainBarrier, Shutdown, State};
use crate::net::Listener;
use crate::observability::metrics;

/// Terminal errors from [`Orchestrator::run`].
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Processors failed to start and `stop_on_processor_start_failure` is set.
    #[error(
        "failed to start {} attached processor(s) and stop_on_processor_start_failure is set",
        .0.len()
    )]
    ProcessorsFailedToStart(Vec<ProcessorFailure>),
    /// In-flight connections outlived the shutdown deadline and were dropped.
    #[error("listener did not shut down within {0:?}")]
    ShutdownDeadlineExceeded(Duration),
    /// OS signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    SignalHandler(#[source] std::io::Error),
}

/// Owns the listener and the attached processors and drives them through
/// `Created → Running → Draining → Stopped`.
pub struct Orchestrator {
    config: Config,
    router: Router,
    processors: ProcessorRegistry,
    state: watch::Sender<State>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        tracing::debug!(
            environment = %config.environment,
            mode = %config.mode(),
            bind_address = %config.bind_address,
            shutdown_wait = ?config.shutdown_wait,
            stop_on_processor_start_failure = config.stop_on_processor_start_failure,
            "Orchestrator created"
        );
        let (state, _) = watch::channel(State::Created);
        Self {
            config,
            router: Router::new(),
            processors: ProcessorRegistry::new(),
            state,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Address the listener binds when the service runs.
    pub fn bind_address(&self) -> &str {
        &self.config.bind_address
    }

    /// Attach a processor. Must happen before `run`.
    pub fn add_processor(&mut self, processor: Arc<dyn Processor>) {
        self.processors.register(processor);
    }

    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// Merge routes into the router the listener serves.
    pub fn merge_router(&mut self, router: Router) {
        self.router = std::mem::take(&mut self.router).merge(router);
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Observe state transitions, including those made while `run` is in progress.
    pub fn subscribe_state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// Start every attached processor. See [`ProcessorRegistry::start_all`].
    pub async fn start_processors(&self, shutdown: &Shutdown) -> Vec<ProcessorFailure> {
        self.processors.start_all(shutdown).await
    }

    /// Ask every attached processor to stop. See [`ProcessorRegistry::stop_all`].
    pub async fn stop_processors(&self, barrier: &DrainBarrier) -> Vec<ProcessorFailure> {
        self.processors.stop_all(barrier).await
    }

    /// Run until SIGINT or SIGTERM, then shut down.
    pub async fn run(self) -> Result<(), LifecycleError> {
        let shutdown = Shutdown::with_os_signals().map_err(LifecycleError::SignalHandler)?;
        self.run_with_shutdown(shutdown).await
    }

    /// Run until `shutdown` fires, then shut down.
    ///
    /// The orchestrator also fires `shutdown` itself if the listener fails.
    pub async fn run_with_shutdown(self, shutdown: Shutdown) -> Result<(), LifecycleError> {
        let failures = self.start_processors(&shutdown).await;
        if !failures.is_empty() {
            metrics::record_processor_failures("start", failures.len());
            if self.config.stop_on_processor_start_failure {
                tracing::error!(
                    failed = failures.len(),
                    "Failed to start one or more attached processors, refusing to serve"
                );
                self.transition(State::Stopped);
                return Err(LifecycleError::ProcessorsFailedToStart(failures));
            }
            tracing::warn!(
                failed = failures.len(),
                "Failed to start one or more attached processors, serving anyway"
            );
        }

        let server = HttpServer::new(ServerTimeouts::from(&self.config), self.router.clone());
        let server_handle = server.handle();
        let listener_task = tokio::spawn(listen(
            server,
            self.config.bind_address.clone(),
            shutdown.clone(),
        ));
        self.transition(State::Running);

        shutdown.triggered().await;
        tracing::info!("Shutting down server");
        self.transition(State::Draining);

        let drain_started = Instant::now();
        let barrier = DrainBarrier::new();
        let failures = self.stop_processors(&barrier).await;
        if !failures.is_empty() {
            metrics::record_processor_failures("stop", failures.len());
            tracing::error!(
                failed = failures.len(),
                "Failed to gracefully stop one or more attached processors"
            );
        }
        barrier.wait().await;
        metrics::record_drain_duration(drain_started);
        tracing::info!(elapsed = ?drain_started.elapsed(), "Processors drained");

        let result = self.shutdown_listener(&server_handle, listener_task).await;
        self.transition(State::Stopped);
        if result.is_ok() {
            tracing::info!("Server exiting");
        }
        result
    }

    /// Close the listening socket, then drain open connections, all within `shutdown_wait`.
    async fn shutdown_listener(
        &self,
        server: &ServerHandle,
        mut listener_task: JoinHandle<()>,
    ) -> Result<(), LifecycleError> {
        let deadline = self.config.shutdown_wait;
        server.stop_accepting();
        let drain = async {
            if let Err(e) = (&mut listener_task).await {
                tracing::error!(error = %e, "Listener task failed");
            }
            server.shutdown().await;
        };
        let drained = tokio::time::timeout(deadline, drain).await;
        match drained {
            Ok(()) => Ok(()),
            Err(_) => {
                tracing::error!(
                    deadline = ?deadline,
                    open_connections = server.open_connections(),
                    "Listener shutdown deadline exceeded, dropping open connections"
                );
                server.force_close();
                if !listener_task.is_finished() {
                    listener_task.abort();
                    let _ = listener_task.await;
                }
                Err(LifecycleError::ShutdownDeadlineExceeded(deadline))
            }
        }
    }

    fn transition(&self, next: State) {
        let previous = self.state.send_replace(next);
        metrics::record_state(next);
        tracing::debug!(from = ?previous, to = ?next, "Lifecycle transition");
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("processors", &self.processors)
            .field("state", &self.state())
            .finish()
    }
}

/// Bind and serve; any failure fires the shutdown event.
async fn listen(server: HttpServer, address: String, shutdown: Shutdown) {
    let result = match Listener::bind(&address).await {
        Ok(listener) => server.serve(listener).await,
        Err(e) => Err(e),
    };
    let Err(e) = result else {
        return;
    };

    if shutdown.is_triggered() {
        tracing::debug!(error = %e, "Listener failed after shutdown began");
    } else {
        tracing::error!(error = %e, "Listener failed");
        shutdown.trigger();
    }
}
