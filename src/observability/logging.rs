//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for release, pretty format for debug, compact for test
//! - `RUST_LOG` overrides the mode's default filter

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Mode;

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(mode: Mode) -> &'static str {
    match mode {
        Mode::Debug => "svc_lifecycle=debug,tower_http=debug,info",
        Mode::Test => "warn",
        Mode::Release => "info",
    }
}

/// Install the global subscriber for `mode`.
pub fn init(mode: Mode) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(mode)));
    let registry = tracing_subscriber::registry().with(filter);

    match mode {
        Mode::Debug => registry.with(fmt::layer().pretty()).try_init(),
        Mode::Test => registry.with(fmt::layer().compact()).try_init(),
        Mode::Release => registry.with(fmt::layer().json()).try_init(),
    }
}
