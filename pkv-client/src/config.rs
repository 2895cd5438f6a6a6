//! # Client Configuration
//!
//! Purpose: Describe the remote endpoint and the pool/pipeline limits in one
//! plain struct, constructible in code or loaded from JSON.
//!
//! ## Notes
//! - Durations are serialized as integer milliseconds (`*_ms` keys).
//! - Missing keys fall back to `ClientConfig::default()`.
//! - Nothing is reconfigurable at runtime; the pool copies the config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// How the pool replaces a connection that closed unexpectedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectPolicy {
    /// Open a replacement in the background as soon as the loss is seen.
    Eager,
    /// Open a replacement only when a caller needs one.
    #[default]
    Lazy,
}

/// Configuration for the client, its pool, and every pooled connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Maximum connections the pool keeps alive at once.
    pub max_connections: usize,
    /// How long `acquire` waits for a free connection. `None` waits forever.
    #[serde(rename = "acquire_timeout_ms", with = "millis")]
    pub acquire_timeout: Option<Duration>,
    /// Deadline for each reply future. `None` waits forever.
    #[serde(rename = "command_timeout_ms", with = "millis")]
    pub command_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Option<Duration>,
    /// Replacement policy for lost connections.
    pub reconnect: ReconnectPolicy,
    /// Close a connection after this many command timeouts in a row.
    /// `None` never closes a connection because of timeouts.
    pub max_consecutive_timeouts: Option<u32>,
    /// Initial capacity of each connection's read buffer.
    pub read_buffer_capacity: usize,
    /// Disable Nagle on pooled sockets.
    pub nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:6379".to_string(),
            max_connections: 8,
            acquire_timeout: Some(Duration::from_secs(1)),
            command_timeout: None,
            connect_timeout: None,
            reconnect: ReconnectPolicy::Lazy,
            max_consecutive_timeouts: None,
            read_buffer_capacity: 8 * 1024,
            nodelay: true,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json(text: &str) -> ClientResult<Self> {
        let config: ClientConfig =
            serde_json::from_str(text).map_err(|err| ClientError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the pool cannot run with.
    pub fn validate(&self) -> ClientResult<()> {
        match self.addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => return Err(ClientError::InvalidAddress(self.addr.clone())),
        }
        if self.max_connections == 0 {
            return Err(ClientError::Config("max_connections must be at least 1".into()));
        }
        if self.read_buffer_capacity == 0 {
            return Err(ClientError::Config("read_buffer_capacity must be positive".into()));
        }
        if self.max_consecutive_timeouts == Some(0) {
            return Err(ClientError::Config(
                "max_consecutive_timeouts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(de)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.reconnect, ReconnectPolicy::Lazy);
        assert_eq!(config.acquire_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn parses_json_with_defaults() {
        let config = ClientConfig::from_json(
            r#"{
                "addr": "10.0.0.5:7000",
                "max_connections": 2,
                "acquire_timeout_ms": 250,
                "command_timeout_ms": null,
                "reconnect": "eager",
                "max_consecutive_timeouts": 3
            }"#,
        )
        .unwrap();
        assert_eq!(config.addr, "10.0.0.5:7000");
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.acquire_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.command_timeout, None);
        assert_eq!(config.reconnect, ReconnectPolicy::Eager);
        assert_eq!(config.max_consecutive_timeouts, Some(3));
        assert_eq!(config.read_buffer_capacity, 8 * 1024);
    }

    #[test]
    fn json_roundtrip_keeps_durations() {
        let mut config = ClientConfig::new("localhost:6379");
        config.command_timeout = Some(Duration::from_millis(1500));
        let text = serde_json::to_string(&config).unwrap();
        assert!(text.contains("\"command_timeout_ms\":1500"));
        assert_eq!(ClientConfig::from_json(&text).unwrap(), config);
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(matches!(
            ClientConfig::new("no-port").validate(),
            Err(ClientError::InvalidAddress(_))
        ));
        assert!(matches!(
            ClientConfig::new("host:notaport").validate(),
            Err(ClientError::InvalidAddress(_))
        ));

        let mut config = ClientConfig::default();
        config.max_connections = 0;
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        assert!(matches!(
            ClientConfig::from_json("{\"max_connections\": \"many\"}"),
            Err(ClientError::Config(_))
        ));
    }
}
