//! Bus connection configuration.
//!
//! | Key                  | Description                                   | Default  |
//! |----------------------|-----------------------------------------------|----------|
//! | `bootstrap.servers`  | Broker addresses                              | required |
//! | `topic`              | Topic carrying needs, solutions and finals    | required |
//! | `group.id`           | Consumer group ID                             | required |
//! | `service.username`   | Service user for SASL authentication          | (none)   |
//! | `service.password`   | Service password                              | (none)   |
//! | `poll.timeout.ms`    | Poll timeout in milliseconds                  | `1000`   |
//! | `max.poll.records`   | Maximum records returned per poll             | `500`    |
//! | `commit.interval.ms` | Upper bound between state write and commit    | `1000`   |

use std::collections::HashMap;

use crate::error::{LogError, Result};

/// Parsed configuration for the bus connection.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Comma-separated list of broker addresses.
    pub bootstrap_servers: String,
    /// The single logical topic carrying both inputs and emitted finals.
    pub topic: String,
    /// Consumer group ID.
    pub group_id: String,
    /// Service user injected into the bus client.
    pub service_username: Option<String>,
    /// Service password.
    pub service_password: Option<String>,
    /// Poll timeout in milliseconds.
    pub poll_timeout_ms: u64,
    /// Maximum number of records returned per poll.
    pub max_poll_records: usize,
    /// Upper bound on delay between a durable state write and the
    /// corresponding offset commit.
    pub commit_interval_ms: u64,
}

impl BusConfig {
    /// Parse a `BusConfig` from a string key-value map.
    ///
    /// Required keys: `bootstrap.servers`, `topic`, `group.id`.
    pub fn from_config_map(config: &HashMap<String, String>) -> Result<Self> {
        let bootstrap_servers = require_non_empty(config, "bootstrap.servers")?;
        let topic = require_non_empty(config, "topic")?;
        let group_id = require_non_empty(config, "group.id")?;

        let service_username = config.get("service.username").cloned();
        let service_password = config.get("service.password").cloned();

        if service_username.is_some() != service_password.is_some() {
            return Err(LogError::Config(
                "'service.username' and 'service.password' must be set together".to_string(),
            ));
        }

        let poll_timeout_ms = parse_or_default(config, "poll.timeout.ms", 1000)?;
        let max_poll_records = parse_or_default(config, "max.poll.records", 500)?;
        let commit_interval_ms = parse_or_default(config, "commit.interval.ms", 1000)?;

        if max_poll_records == 0 {
            return Err(LogError::Config(
                "'max.poll.records' must be greater than zero".to_string(),
            ));
        }

        Ok(BusConfig {
            bootstrap_servers,
            topic,
            group_id,
            service_username,
            service_password,
            poll_timeout_ms,
            max_poll_records,
            commit_interval_ms,
        })
    }
}

fn require_non_empty(config: &HashMap<String, String>, key: &str) -> Result<String> {
    let value = config
        .get(key)
        .ok_or_else(|| LogError::Config(format!("missing required '{}'", key)))?;
    if value.trim().is_empty() {
        return Err(LogError::Config(format!("'{}' must not be empty", key)));
    }
    Ok(value.clone())
}

fn parse_or_default<T: std::str::FromStr>(
    config: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match config.get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| LogError::Config(format!("invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
