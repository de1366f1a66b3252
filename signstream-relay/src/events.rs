//! Connection lifecycle events surfaced to the host

use crate::protocol::WireMessage;
use serde::Serialize;
use signstream_types::{ConnectionQuality, ConnectionState};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything one managed connection tells the outside world.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// Socket open and the config announcement sent
    Connected,

    /// Socket closed, by either side
    Disconnected { reason: String },

    /// Lifecycle transition
    StateChange {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// Application message received from the display
    Message(WireMessage),

    /// Transport-level error
    Error { message: String },

    /// Link quality classification changed
    QualityChange {
        from: ConnectionQuality,
        to: ConnectionQuality,
    },
}

/// Broadcast fan-out for [`ConnectionEvent`]s.
#[derive(Debug, Clone)]
pub struct ConnectionEventBus {
    tx: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionEventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for ConnectionEventBus {
    fn default() -> Self {
        Self::new()
    }
}
