//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for a chat client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Server endpoint (e.g., `https://chat.example.com`).
    #[serde(default = "ClientConfig::default_endpoint")]
    pub endpoint: String,

    /// How long to wait for a join acknowledgment, in seconds. 0 waits forever.
    #[serde(default = "ClientConfig::default_join_timeout")]
    pub join_timeout_seconds: u64,

    /// Reconnect attempts after the link drops.
    #[serde(default = "ClientConfig::default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Delay between reconnect attempts, in milliseconds.
    #[serde(default = "ClientConfig::default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Capacity of the inbound event buffer.
    #[serde(default = "ClientConfig::default_inbound_buffer")]
    pub inbound_buffer: usize,
}

impl ClientConfig {
    fn default_endpoint() -> String {
        "http://localhost:3000".to_string()
    }

    const fn default_join_timeout() -> u64 {
        15
    }

    const fn default_reconnect_attempts() -> u32 {
        5
    }

    const fn default_reconnect_delay() -> u64 {
        1000
    }

    const fn default_inbound_buffer() -> usize {
        128
    }

    /// Create a config for `endpoint` with default settings.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Get the join timeout, or `None` when disabled.
    #[must_use]
    pub fn join_timeout(&self) -> Option<Duration> {
        (self.join_timeout_seconds > 0).then(|| Duration::from_secs(self.join_timeout_seconds))
    }

    /// Get the reconnect delay as a `Duration`.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Transport options derived from this config.
    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            reconnect_attempts: self.reconnect_attempts,
            reconnect_delay: self.reconnect_delay(),
            inbound_buffer: self.inbound_buffer,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            join_timeout_seconds: Self::default_join_timeout(),
            reconnect_attempts: Self::default_reconnect_attempts(),
            reconnect_delay_ms: Self::default_reconnect_delay(),
            inbound_buffer: Self::default_inbound_buffer(),
        }
    }
}

/// Options handed to a transport when connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Reconnect attempts after the link drops.
    pub reconnect_attempts: u32,
    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Capacity of the inbound event buffer.
    pub inbound_buffer: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ClientConfig::default().connect_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, "http://localhost:3000");
        assert_eq!(config.join_timeout_seconds, 15);
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.inbound_buffer, 128);
    }

    #[test]
    fn durations() {
        let config = ClientConfig::default();
        assert_eq!(config.join_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.reconnect_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn zero_join_timeout_disables_it() {
        let config = ClientConfig {
            join_timeout_seconds: 0,
            ..ClientConfig::default()
        };
        assert_eq!(config.join_timeout(), None);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{ "endpoint": "https://chat.example.com" }"#).unwrap();
        assert_eq!(config.endpoint, "https://chat.example.com");
        assert_eq!(config.reconnect_delay_ms, 1000);
    }
}
