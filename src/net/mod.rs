//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection IDs)
//!     → connection.rs (in-flight tracking, idle detection)
//!     → Hand off to HTTP layer
//!
//! Connection States:
//!     Active → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - Each connection tracked for graceful shutdown
//! - Idle keep-alive connections are closed by the server, not the client

pub mod connection;
pub mod listener;

pub use connection::{Activity, ConnectionGuard, ConnectionId, ConnectionState};
pub use listener::{Listener, ListenerError};
