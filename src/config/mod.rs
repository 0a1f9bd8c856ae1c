//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) / CLI flags
//!     → loader.rs (parse & deserialize into Options)
//!     → schema.rs Options::values_or_defaults (fill zero-valued fields)
//!     → Config (resolved, immutable)
//!     → owned by the Orchestrator for its whole life
//! ```
//!
//! # Design Decisions
//! - Config is immutable once resolved; there is no reload path
//! - Zero values mean "unset" and resolve to fixed defaults
//! - Resolution never fails; only reading or parsing a file can

pub mod loader;
pub mod schema;

pub use loader::{load_options, parse_options, ConfigError};
pub use schema::{Config, Environment, Mode, Options};
