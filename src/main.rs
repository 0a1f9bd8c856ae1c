//! svc-lifecycle demo service.
//!
//! Serves `/status` and runs a heartbeat worker next to the listener. Stop it with Ctrl+C or
//! SIGTERM: the worker drains first, then the listener shuts down within `shutdown_wait`.

use async_trait::async_trait;
use axum::{routing::get, Json, Router};
use clap::Parser;
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use svc_lifecycle::config::{load_options, Options};
use svc_lifecycle::observability::{logging, metrics};
use svc_lifecycle::{DrainBarrier, Orchestrator, Processor, ProcessorError, Shutdown};

#[derive(Parser)]
#[command(name = "svc-lifecycle")]
#[command(about = "HTTP service with lifecycle-managed background processors", long_about = None)]
struct Cli {
    /// TOML options file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Deployment environment (development, test, staging, integration, sandbox, production).
    #[arg(short, long)]
    environment: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    shutdown_wait_secs: Option<u64>,

    /// Refuse to serve if a processor fails to start.
    #[arg(long)]
    stop_on_processor_start_failure: bool,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    metrics_address: Option<SocketAddr>,

    #[arg(long, default_value_t = 5)]
    heartbeat_secs: u64,
}

impl Cli {
    fn options(&self) -> Result<Options, Box<dyn std::error::Error>> {
        let mut opts = match &self.config {
            Some(path) => load_options(path)?,
            None => Options::default(),
        };
        if let Some(environment) = &self.environment {
            opts.environment = environment.clone();
        }
        if let Some(port) = self.port {
            opts.port = port;
        }
        if let Some(secs) = self.shutdown_wait_secs {
            opts.shutdown_wait = Duration::from_secs(secs);
        }
        if self.stop_on_processor_start_failure {
            opts.stop_on_processor_start_failure = true;
        }
        Ok(opts)
    }
}

/// Logs a heartbeat on an interval until stopped.
struct Heartbeat {
    interval: Duration,
    quit: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Heartbeat {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            quit: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Processor for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }

    async fn start(&self, _shutdown: &Shutdown) -> Result<(), ProcessorError> {
        let (tx, mut rx) = oneshot::channel();
        let mut ticker = tokio::time::interval(self.interval);
        let worker = tokio::spawn(async move {
            tracing::info!("Heartbeat worker starting");
            let mut beats: u64 = 0;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        beats += 1;
                        tracing::debug!(beats, "Heartbeat");
                    }
                    _ = &mut rx => break,
                }
            }
            tracing::info!(beats, "Heartbeat worker stopped");
        });

        *self.quit.lock().map_err(|_| ProcessorError::msg("heartbeat state poisoned"))? = Some(tx);
        *self.worker.lock().map_err(|_| ProcessorError::msg("heartbeat state poisoned"))? = Some(worker);
        Ok(())
    }

    async fn stop(&self, barrier: &DrainBarrier) -> Result<(), ProcessorError> {
        let quit = self.quit.lock().ok().and_then(|mut q| q.take());
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());

        if let Some(quit) = quit {
            let _ = quit.send(());
        }
        let result = match worker {
            Some(worker) => worker
                .await
                .map_err(|e| ProcessorError::Other(Box::new(e))),
            None => Err(ProcessorError::msg("heartbeat was never started")),
        };
        barrier.done();
        result
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.options()?.resolve();

    logging::init(config.mode())?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        mode = %config.mode(),
        bind_address = %config.bind_address,
        "svc-lifecycle starting"
    );

    if let Some(addr) = cli.metrics_address {
        metrics::init_metrics(addr);
    }

    let environment = config.environment.to_string();
    let mut orchestrator = Orchestrator::new(config);
    orchestrator.merge_router(Router::new().route(
        "/status",
        get(move || {
            let environment = environment.clone();
            async move {
                Json(json!({
                    "status": "ok",
                    "environment": environment,
                    "version": env!("CARGO_PKG_VERSION"),
                }))
            }
        }),
    ));
    orchestrator.add_processor(Arc::new(Heartbeat::new(Duration::from_secs(
        cli.heartbeat_secs.max(1),
    ))));

    orchestrator.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
