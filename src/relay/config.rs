use std::time::Duration;

use bon::Builder;

use crate::config::{self, ConfigurationError};
use crate::message::DEFAULT_MAX_RECORD_LEN;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8888;

/// Configuration for the relay.
#[derive(Debug, Clone, Builder)]
pub struct RelayConfig {
    /// Address to listen on.
    #[builder(into, default = DEFAULT_HOST.to_string())]
    pub host: String,

    /// Port to listen on. `0` picks a free port.
    #[builder(default = DEFAULT_PORT)]
    pub port: u16,

    /// Longest accepted record, delimiter excluded. Longer records close the connection.
    #[builder(default = DEFAULT_MAX_RECORD_LEN)]
    pub max_record_len: usize,

    /// Records queued per client before further deliveries to it are dropped.
    #[builder(default = 256)]
    pub outbound_capacity: usize,

    /// Records queued for the router before connection readers wait.
    #[builder(default = 1024)]
    pub inbound_capacity: usize,

    /// How long a new connection has to send its `cid`.
    #[builder(default = Duration::from_secs(10))]
    pub handshake_timeout: Duration,

    /// How long a closing connection may keep flushing queued records to a peer that is not
    /// reading before they are dropped.
    #[builder(default = Duration::from_secs(1))]
    pub drain_timeout: Duration,
}

impl RelayConfig {
    /// Build from `RELAY_HOST` / `RELAY_PORT`, with defaults for everything else.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let config = Self::builder()
            .host(config::env_or(config::RELAY_HOST, DEFAULT_HOST.to_string())?)
            .port(config::env_or(config::RELAY_PORT, DEFAULT_PORT)?)
            .build();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        config::validate_host(&self.host)?;

        let limits = [
            ("max_record_len", self.max_record_len),
            ("outbound_capacity", self.outbound_capacity),
            ("inbound_capacity", self.inbound_capacity),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigurationError::ZeroLimit { name });
            }
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigurationError::ZeroLimit {
                name: "handshake_timeout",
            });
        }

        Ok(())
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.address(), "127.0.0.1:8888");
        assert_eq!(config.max_record_len, 64 * 1024);
        assert_eq!(config.drain_timeout, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ipv6_address() {
        let config = RelayConfig::builder().host("::1").port(9000).build();
        assert_eq!(config.address(), "[::1]:9000");
    }

    #[test]
    fn test_rejects_zero_limits() {
        let config = RelayConfig::builder().outbound_capacity(0).build();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ZeroLimit {
                name: "outbound_capacity"
            })
        ));
    }

    #[test]
    fn test_rejects_bad_host() {
        let config = RelayConfig::builder().host("not a host").build();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidHost(_))
        ));
    }
}
