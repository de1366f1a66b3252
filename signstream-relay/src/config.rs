//! Per-connection configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one display connection.
///
/// Defaults favor resilience over failing fast: reconnection with
/// exponential backoff, offline buffering and heartbeat supervision are
/// all on unless the host turns them off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// WebSocket endpoint of the remote display (ws:// or wss://).
    pub url: String,

    /// Whether unexpected disconnects schedule reconnection.
    pub reconnect: bool,

    /// Reconnect attempts before giving up for good.
    pub max_reconnect_attempts: u32,

    /// Base delay for the exponential backoff schedule (ms).
    pub reconnect_base_delay_ms: u64,

    /// Backoff ceiling (ms).
    pub max_reconnect_delay_ms: u64,

    /// Interval between heartbeat pings (ms).
    pub heartbeat_interval_ms: u64,

    /// How long a ping may go unanswered before counting as missed (ms).
    pub heartbeat_timeout_ms: u64,

    /// Whether sends while disconnected are buffered for later flush.
    pub buffer_messages: bool,

    /// Offline buffer capacity; sends beyond it are rejected.
    pub max_buffer_size: usize,

    /// Identifier announced to the display on connect.
    pub client_id: String,

    /// Role announced to the display on connect.
    pub client_type: String,

    /// Capabilities announced to the display on connect.
    pub capabilities: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect: true,
            max_reconnect_attempts: 10,
            reconnect_base_delay_ms: 1000,
            max_reconnect_delay_ms: 30_000,
            heartbeat_interval_ms: 15_000,
            heartbeat_timeout_ms: 5_000,
            buffer_messages: true,
            max_buffer_size: 100,
            client_id: String::new(),
            client_type: "interpreter".to_string(),
            capabilities: vec!["signs".to_string(), "status".to_string()],
        }
    }
}

impl ConnectionConfig {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert!(config.reconnect);
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.max_buffer_size, 100);
        assert_eq!(config.client_type, "interpreter");
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"url": "ws://display.local:9090", "reconnect": false}"#)
                .unwrap();
        assert_eq!(config.url, "ws://display.local:9090");
        assert!(!config.reconnect);
        assert_eq!(config.heartbeat_interval_ms, 15_000);
    }
}
