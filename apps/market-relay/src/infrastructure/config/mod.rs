//! Configuration module for the relay.

mod settings;

pub use settings::{
    ConfigError, RelayConfig, ServerSettings, SessionSettings, UpstreamSettings,
};
