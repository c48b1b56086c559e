//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.
//! No credentials are involved; the provider streams are public. Every
//! setting has a default, so an empty environment yields a working config.

use std::time::Duration;

use crate::domain::history::DEFAULT_HISTORY_CAPACITY;

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Port the downstream WebSocket server listens on.
    pub ws_port: u16,
    /// Port the health/metrics HTTP server listens on.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_port: 8080,
            health_port: 8082,
        }
    }
}

/// Upstream provider connection settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Base WebSocket endpoint; the stream name is appended per key.
    pub endpoint: String,
    /// How long a read may stay quiet before the loop re-arms its timer.
    pub receive_timeout: Duration,
    /// Interval between pings on an idle upstream connection.
    pub keepalive_interval: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            endpoint: "wss://fstream.binance.com/ws".to_string(),
            receive_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(180),
        }
    }
}

/// Downstream client session settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Bounded per-client event queue; overflow disconnects the client.
    pub queue_capacity: usize,
    /// Idle interval after which a session sends a heartbeat message.
    pub heartbeat_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Upstream provider settings.
    pub upstream: UpstreamSettings,
    /// Downstream session settings.
    pub session: SessionSettings,
    /// Events retained per stream for subscriber snapshots.
    pub history_capacity: usize,
    /// Symbols accepted in addition to the built-in market set.
    pub extra_symbols: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            upstream: UpstreamSettings::default(),
            session: SessionSettings::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            extra_symbols: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Create configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `MARKET_RELAY_UPSTREAM_URL` is set to a
    /// non-WebSocket URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let endpoint = std::env::var("MARKET_RELAY_UPSTREAM_URL")
            .unwrap_or_else(|_| defaults.upstream.endpoint.clone());
        if !endpoint.starts_with("ws://") && !endpoint.starts_with("wss://") {
            return Err(ConfigError::InvalidValue {
                var: "MARKET_RELAY_UPSTREAM_URL",
                value: endpoint,
            });
        }

        let server = ServerSettings {
            ws_port: parse_env_u16("MARKET_RELAY_WS_PORT", defaults.server.ws_port),
            health_port: parse_env_u16("MARKET_RELAY_HEALTH_PORT", defaults.server.health_port),
        };

        let upstream = UpstreamSettings {
            endpoint,
            receive_timeout: parse_env_duration_secs(
                "MARKET_RELAY_RECEIVE_TIMEOUT_SECS",
                defaults.upstream.receive_timeout,
            ),
            keepalive_interval: parse_env_duration_secs(
                "MARKET_RELAY_KEEPALIVE_INTERVAL_SECS",
                defaults.upstream.keepalive_interval,
            ),
        };

        let session = SessionSettings {
            queue_capacity: parse_env_usize(
                "MARKET_RELAY_SESSION_QUEUE_CAPACITY",
                defaults.session.queue_capacity,
            ),
            heartbeat_interval: parse_env_duration_secs(
                "MARKET_RELAY_HEARTBEAT_INTERVAL_SECS",
                defaults.session.heartbeat_interval,
            ),
        };

        let history_capacity =
            parse_env_usize("MARKET_RELAY_HISTORY_CAPACITY", defaults.history_capacity);

        let extra_symbols = std::env::var("MARKET_RELAY_SYMBOLS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server,
            upstream,
            session,
            history_capacity,
            extra_symbols,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds a value the relay cannot use.
    #[error("invalid value for {var}: {value}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}

fn parse_env_u16(name: &str, default: u16) -> u16 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_relay_contract() {
        let config = RelayConfig::default();

        assert_eq!(config.server.ws_port, 8080);
        assert_eq!(config.server.health_port, 8082);
        assert_eq!(config.upstream.endpoint, "wss://fstream.binance.com/ws");
        assert_eq!(config.upstream.receive_timeout, Duration::from_secs(30));
        assert_eq!(config.upstream.keepalive_interval, Duration::from_secs(180));
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.history_capacity, 50);
    }

    #[test]
    fn parse_helpers_fall_back_on_garbage() {
        // Unset variables fall back to the provided defaults.
        assert_eq!(parse_env_u16("MARKET_RELAY_TEST_UNSET_U16", 7), 7);
        assert_eq!(parse_env_usize("MARKET_RELAY_TEST_UNSET_USIZE", 9), 9);
        assert_eq!(
            parse_env_duration_secs("MARKET_RELAY_TEST_UNSET_SECS", Duration::from_secs(3)),
            Duration::from_secs(3)
        );
    }
}
