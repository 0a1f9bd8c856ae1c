//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper HTTP/1.1 connection, read/idle timeouts)
//!     → middleware (request ID, tracing, write timeout)
//!     → caller's Axum Router
//!     → Send to client
//! ```

pub mod server;

pub use server::{HttpServer, ServerHandle, ServerTimeouts};
