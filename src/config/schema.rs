//! Configuration schema definitions.
//!
//! [`Options`] is what callers (and config files) supply: any field may be left at its zero
//! value. [`Options::values_or_defaults`] fills those gaps and [`Options::resolve`] turns the
//! result into the immutable [`Config`] the orchestrator runs with.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SHUTDOWN_WAIT: Duration = Duration::from_secs(30);

/// Partially-populated service options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Options {
    /// One of development, test, staging, integration, sandbox, production.
    /// Empty means development.
    pub environment: String,

    /// Port the listener binds on all interfaces. Zero means 3000.
    pub port: u16,

    /// Time a handler has to produce its response. Zero means 15s.
    #[serde(rename = "write_timeout_secs", with = "duration_secs")]
    pub write_timeout: Duration,

    /// Time a client has to send request headers. Zero means 15s.
    #[serde(rename = "read_timeout_secs", with = "duration_secs")]
    pub read_timeout: Duration,

    /// Time an idle keep-alive connection is kept open. Zero means 60s.
    #[serde(rename = "idle_timeout_secs", with = "duration_secs")]
    pub idle_timeout: Duration,

    /// Deadline for in-flight connections once processors have drained. Zero means 30s.
    #[serde(rename = "shutdown_wait_secs", with = "duration_secs")]
    pub shutdown_wait: Duration,

    /// Refuse to serve if any attached processor fails to start.
    pub stop_on_processor_start_failure: bool,
}

impl Options {
    /// Replace every zero-valued field with its default.
    pub fn values_or_defaults(mut self) -> Self {
        if self.environment.is_empty() {
            self.environment = DEFAULT_ENVIRONMENT.to_string();
        }
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.write_timeout.is_zero() {
            self.write_timeout = DEFAULT_WRITE_TIMEOUT;
        }
        if self.read_timeout.is_zero() {
            self.read_timeout = DEFAULT_READ_TIMEOUT;
        }
        if self.idle_timeout.is_zero() {
            self.idle_timeout = DEFAULT_IDLE_TIMEOUT;
        }
        if self.shutdown_wait.is_zero() {
            self.shutdown_wait = DEFAULT_SHUTDOWN_WAIT;
        }
        self
    }

    /// Runtime mode implied by the environment string.
    pub fn mode(&self) -> Mode {
        Environment::from(self.environment.as_str()).mode()
    }

    /// Fill defaults and freeze into a [`Config`].
    pub fn resolve(self) -> Config {
        let opts = self.values_or_defaults();
        Config {
            environment: Environment::from(opts.environment),
            bind_address: format!("0.0.0.0:{}", opts.port),
            write_timeout: opts.write_timeout,
            read_timeout: opts.read_timeout,
            idle_timeout: opts.idle_timeout,
            shutdown_wait: opts.shutdown_wait,
            stop_on_processor_start_failure: opts.stop_on_processor_start_failure,
        }
    }
}

/// Fully resolved configuration. Every duration is strictly positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub environment: Environment,
    pub bind_address: String,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
    pub idle_timeout: Duration,
    pub shutdown_wait: Duration,
    pub stop_on_processor_start_failure: bool,
}

impl Config {
    pub fn mode(&self) -> Mode {
        self.environment.mode()
    }
}

impl Default for Config {
    fn default() -> Self {
        Options::default().resolve()
    }
}

/// Deployment environment the service runs in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Integration,
    Sandbox,
    Production,
    /// Anything else, kept verbatim.
    Other(String),
}

impl Environment {
    /// Map the environment onto a runtime mode.
    ///
    /// Unknown environments run in release mode: verbose behaviour has to be asked for.
    pub fn mode(&self) -> Mode {
        match self {
            Environment::Development => Mode::Debug,
            Environment::Test => Mode::Test,
            Environment::Staging
            | Environment::Integration
            | Environment::Sandbox
            | Environment::Production
            | Environment::Other(_) => Mode::Release,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Integration => "integration",
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
            Environment::Other(name) => name,
        }
    }
}

impl From<&str> for Environment {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "development" => Environment::Development,
            "test" => Environment::Test,
            "staging" => Environment::Staging,
            "integration" => Environment::Integration,
            "sandbox" => Environment::Sandbox,
            "production" => Environment::Production,
            _ => Environment::Other(value.to_string()),
        }
    }
}

impl From<String> for Environment {
    fn from(value: String) -> Self {
        Environment::from(value.as_str())
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime mode, drives logging verbosity and format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Debug,
    Test,
    Release,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Debug => f.write_str("debug"),
            Mode::Test => f.write_str("test"),
            Mode::Release => f.write_str("release"),
        }
    }
}

/// Whole-second durations in config files.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
