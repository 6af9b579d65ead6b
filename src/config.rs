//! Adapter configuration.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

use crate::v2::MINIMUM_LENGTH;

/// Default bound on buffered bytes while decoding: the largest binary header.
pub const DEFAULT_MAX_HEADER_BYTES: usize = MINIMUM_LENGTH + u16::MAX as usize;

/// Default maximum concurrent connections per listener.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10000;

/// Limits and buffer sizes for decoding and relaying connections.
///
/// Can be deserialized from any serde format; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bytes buffered from the network before a header must have been decoded.
    pub max_header_bytes: usize,
    /// Milliseconds to wait for a complete header.
    pub decode_timeout_ms: u64,
    /// Size of each socket read.
    pub read_buffer_size: usize,
    /// Credit the network side grants the application when the connection opens.
    pub network_window: u32,
    /// Depth of the frame channels between a connection and its application.
    pub channel_capacity: usize,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            decode_timeout_ms: 5000,
            read_buffer_size: 8192,
            network_window: 65536,
            channel_capacity: 64,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

fn var<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.parse())
        .transpose()
        .with_context(|| format!("{} must be an integer.", name))
        .map(|value| value.unwrap_or(default))
}

impl Config {
    /// Load configuration from `PPA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Config::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let defaults = Config::default();

        let config = Config {
            max_header_bytes: var(&lookup, "PPA_MAX_HEADER_BYTES", defaults.max_header_bytes)?,
            decode_timeout_ms: var(&lookup, "PPA_DECODE_TIMEOUT_MS", defaults.decode_timeout_ms)?,
            read_buffer_size: var(&lookup, "PPA_READ_BUFFER_SIZE", defaults.read_buffer_size)?,
            network_window: var(&lookup, "PPA_NETWORK_WINDOW", defaults.network_window)?,
            channel_capacity: var(&lookup, "PPA_CHANNEL_CAPACITY", defaults.channel_capacity)?,
            max_connections: var(&lookup, "PPA_MAX_CONNECTIONS", defaults.max_connections)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Rejects values the adapter cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_header_bytes >= MINIMUM_LENGTH,
            "max_header_bytes must be at least {} bytes.",
            MINIMUM_LENGTH
        );
        ensure!(self.decode_timeout_ms > 0, "decode_timeout_ms must not be zero.");
        ensure!(self.read_buffer_size > 0, "read_buffer_size must not be zero.");
        ensure!(self.channel_capacity > 0, "channel_capacity must not be zero.");
        ensure!(self.max_connections > 0, "max_connections must not be zero.");

        Ok(())
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::default();

        assert_eq!(config.max_header_bytes, 65551);
        assert_eq!(config.decode_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_lookup_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PPA_MAX_HEADER_BYTES", "1024"),
            ("PPA_NETWORK_WINDOW", "4096"),
        ]))
        .unwrap();

        assert_eq!(config.max_header_bytes, 1024);
        assert_eq!(config.network_window, 4096);
        assert_eq!(config.read_buffer_size, 8192);
    }

    #[test]
    fn from_lookup_rejects_garbage() {
        let error = Config::from_lookup(lookup(&[("PPA_DECODE_TIMEOUT_MS", "soon")])).unwrap_err();

        assert!(error.to_string().contains("PPA_DECODE_TIMEOUT_MS"));
    }

    #[test]
    fn from_lookup_validates() {
        assert!(Config::from_lookup(lookup(&[("PPA_MAX_HEADER_BYTES", "8")])).is_err());
        assert!(Config::from_lookup(lookup(&[("PPA_CHANNEL_CAPACITY", "0")])).is_err());
    }

    #[test]
    fn deserialize_partial() {
        let config: Config = toml::from_str("decode_timeout_ms = 250\nmax_connections = 8").unwrap();

        assert_eq!(config.decode_timeout(), Duration::from_millis(250));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.channel_capacity, 64);
    }
}
