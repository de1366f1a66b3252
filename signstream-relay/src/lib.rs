//! Fan-out of interpretation output to remote display surfaces
//!
//! Each remote display gets one managed WebSocket connection with
//! reconnection, heartbeat supervision, offline buffering, delivery acks
//! and link-quality classification. A pool keys the managers by display id
//! and broadcasts to whichever are currently connected.

pub mod backoff;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod pool;
pub mod protocol;

pub use config::ConnectionConfig;
pub use error::{RelayError, Result};
pub use events::{ConnectionEvent, ConnectionEventBus};
pub use manager::ConnectionManager;
pub use pool::ConnectionPool;
pub use protocol::{MessagePayload, WireMessage};
