//! Shared utilities for lifecycle integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use svc_lifecycle::{DrainBarrier, Options, Processor, ProcessorError, Shutdown, State};

/// Processor that counts its calls and fails or stalls on request.
pub struct MockProcessor {
    name: String,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: bool,
    fail_stop: bool,
    stop_delay: Duration,
    log: Option<Arc<Mutex<Vec<String>>>>,
}

impl MockProcessor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_start: false,
            fail_stop: false,
            stop_delay: Duration::ZERO,
            log: None,
        }
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Hold the barrier slot for `delay` before releasing it.
    pub fn stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn record(&self, event: &str) {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("{event} {}", self.name));
        }
    }
}

#[async_trait]
impl Processor for MockProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _shutdown: &Shutdown) -> Result<(), ProcessorError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.record("start");
        if self.fail_start {
            return Err(ProcessorError::msg("totally bad thing that happened"));
        }
        Ok(())
    }

    async fn stop(&self, barrier: &DrainBarrier) -> Result<(), ProcessorError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.record("stop");
        if !self.stop_delay.is_zero() {
            tokio::time::sleep(self.stop_delay).await;
        }
        barrier.done();
        if self.fail_stop {
            return Err(ProcessorError::msg("why doesn't anything work"));
        }
        Ok(())
    }
}

/// Options for a test service on `port`.
pub fn options(port: u16) -> Options {
    Options {
        environment: "test".into(),
        port,
        shutdown_wait: Duration::from_secs(1),
        ..Options::default()
    }
}

pub async fn wait_for_state(rx: &mut watch::Receiver<State>, state: State) {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for state")
        .expect("orchestrator dropped");
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
