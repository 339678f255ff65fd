use std::net::SocketAddr;
use std::num::{NonZeroU64, NonZeroUsize};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a valid port number, got {value:?}")]
    InvalidPort { var: &'static str, value: String },

    #[error("{var} must be a positive integer, got {value:?}")]
    NotPositive { var: &'static str, value: String },

    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),
}

/// Runtime settings, read from `BUILDTRIGGER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Upper bound on simultaneously running builds. `None` means unbounded.
    pub max_concurrent_builds: Option<NonZeroUsize>,
    /// Kill builds that run longer than this. `None` means no deadline.
    pub build_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_concurrent_builds: None,
            build_timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let host = lookup("BUILDTRIGGER_HOST").unwrap_or(defaults.host);

        let port = match lookup("BUILDTRIGGER_PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort {
                var: "BUILDTRIGGER_PORT",
                value,
            })?,
            None => defaults.port,
        };

        let max_concurrent_builds = lookup("BUILDTRIGGER_MAX_CONCURRENT_BUILDS")
            .map(|value| positive::<NonZeroUsize>("BUILDTRIGGER_MAX_CONCURRENT_BUILDS", value))
            .transpose()?;

        let build_timeout = lookup("BUILDTRIGGER_BUILD_TIMEOUT_SECS")
            .map(|value| positive::<NonZeroU64>("BUILDTRIGGER_BUILD_TIMEOUT_SECS", value))
            .transpose()?
            .map(|secs| Duration::from_secs(secs.get()));

        Ok(Self {
            host,
            port,
            max_concurrent_builds,
            build_timeout,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }
}

fn positive<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::NotPositive { var, value })
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
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.socket_addr().unwrap().port(), 3000);
    }

    #[test]
    fn reads_all_variables() {
        let config = Config::from_lookup(lookup(&[
            ("BUILDTRIGGER_HOST", "127.0.0.1"),
            ("BUILDTRIGGER_PORT", "8080"),
            ("BUILDTRIGGER_MAX_CONCURRENT_BUILDS", "4"),
            ("BUILDTRIGGER_BUILD_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.max_concurrent_builds, NonZeroUsize::new(4));
        assert_eq!(config.build_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn rejects_bad_port() {
        let err = Config::from_lookup(lookup(&[("BUILDTRIGGER_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { .. }));
    }

    #[test]
    fn rejects_zero_limits() {
        let err = Config::from_lookup(lookup(&[("BUILDTRIGGER_MAX_CONCURRENT_BUILDS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotPositive { .. }));

        for value in ["0", "soon", "-5"] {
            let err = Config::from_lookup(lookup(&[("BUILDTRIGGER_BUILD_TIMEOUT_SECS", value)]))
                .unwrap_err();
            assert!(matches!(err, ConfigError::NotPositive { .. }), "{value}");
        }
    }

    #[test]
    fn bad_host_fails_at_bind_time() {
        let config = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.socket_addr(),
            Err(ConfigError::InvalidAddress(_))
        ));
    }
}
