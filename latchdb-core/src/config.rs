//! Store configuration read from the environment.
//!
//! | variable | meaning | default |
//! |---|---|---|
//! | `MONGODB` | connection URI | `mongodb://127.0.0.1:27017/latchdb` |
//! | `MONGODB_CONCURRENT` | pool size | `128` |
//! | `MONGODB_TIMEOUT` | per-operation timeout (`3s`, `500ms`, `1m 30s`) | `3s` |
//!
//! Malformed values are logged and replaced with the default, never fatal.

use std::time::Duration;
use tracing::warn;

use crate::backend::SessionOptions;

pub const ADDRESS_VAR: &str = "MONGODB";
pub const CONCURRENCY_VAR: &str = "MONGODB_CONCURRENT";
pub const TIMEOUT_VAR: &str = "MONGODB_TIMEOUT";

pub const DEFAULT_ADDRESS: &str = "mongodb://127.0.0.1:27017/latchdb";
pub const DEFAULT_CONCURRENCY: usize = 128;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Connection settings for a record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store connection URI.
    pub address: String,
    /// Number of pooled sessions.
    pub concurrency: usize,
    /// Upper bound for a single store operation.
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    ///
    /// Unset and empty variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(address) = read(ADDRESS_VAR) {
            config.address = address.trim().to_string();
        }

        if let Some(raw) = read(CONCURRENCY_VAR) {
            match raw.trim().parse::<usize>() {
                Ok(concurrency) if concurrency > 0 => config.concurrency = concurrency,
                _ => warn!(
                    env = CONCURRENCY_VAR,
                    value = %raw,
                    default = DEFAULT_CONCURRENCY,
                    "invalid pool size, using default"
                ),
            }
        }

        if let Some(raw) = read(TIMEOUT_VAR) {
            match humantime::parse_duration(raw.trim()) {
                Ok(timeout) => config.timeout = timeout,
                Err(err) => warn!(
                    env = TIMEOUT_VAR,
                    value = %raw,
                    error = %err,
                    default = ?DEFAULT_TIMEOUT,
                    "invalid timeout, using default"
                ),
            }
        }

        config
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Session settings derived from this configuration: strong consistency, the
    /// configured operation timeout and no cursor idle timeout.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            socket_timeout: self.timeout,
            ..SessionOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Consistency;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();

        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(StoreConfig::from_lookup(lookup(&[])), StoreConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("MONGODB", "mongodb://db:27017/fleet"),
            ("MONGODB_CONCURRENT", "16"),
            ("MONGODB_TIMEOUT", "1m 30s"),
        ]));

        assert_eq!(config.address, "mongodb://db:27017/fleet");
        assert_eq!(config.concurrency, 16);
        assert_eq!(config.timeout, Duration::from_secs(90));
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("MONGODB", "  "),
            ("MONGODB_CONCURRENT", "lots"),
            ("MONGODB_TIMEOUT", "soon"),
        ]));

        assert_eq!(config, StoreConfig::default());
        assert_eq!(
            StoreConfig::from_lookup(lookup(&[("MONGODB_CONCURRENT", "0")])).concurrency,
            DEFAULT_CONCURRENCY
        );
    }

    #[test]
    fn session_options_carry_the_timeout() {
        let options = StoreConfig::default()
            .with_timeout(Duration::from_millis(500))
            .session_options();

        assert_eq!(options.socket_timeout, Duration::from_millis(500));
        assert_eq!(options.consistency, Consistency::Strong);
        assert_eq!(options.cursor_timeout, None);
    }
}
