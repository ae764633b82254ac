//! Service configuration.
//!
//! All configuration is done via environment variables:
//!
//! - `BEHOVSAMLER_BOOTSTRAP`: bus endpoint list (default: `localhost:9092`)
//! - `BEHOVSAMLER_TOPIC`: topic carrying needs, solutions and finals
//!   (default: `helse-behov-v1`)
//! - `BEHOVSAMLER_GROUP`: consumer group ID (default: `behovsamler-v1`)
//! - `BEHOVSAMLER_STATE_DIR`: local path for the state store
//!   (default: `./data/state`)
//! - `BEHOVSAMLER_COMMIT_INTERVAL_MS`: upper bound on delay between state
//!   write and offset commit (default: `1000`)
//! - `BEHOVSAMLER_PARTITIONS`: partition count of the topic (default: `8`)
//! - `SERVICE_USERNAME` / `SERVICE_PASSWORD`: credentials injected into
//!   the bus client (optional, set together)

use std::collections::HashMap;

use behovsamler_log::{BusConfig, LogError};

use crate::error::Result;

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bus connection settings.
    pub bus: BusConfig,
    /// Local path for the state store's on-disk sections.
    pub state_dir: String,
    /// Partition count of the topic.
    pub partitions: u32,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load configuration from a variable map (testable entry point).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str, default: &str| -> String {
            vars.get(key).cloned().unwrap_or_else(|| default.to_string())
        };

        let mut bus_map = HashMap::new();
        bus_map.insert(
            "bootstrap.servers".to_string(),
            get("BEHOVSAMLER_BOOTSTRAP", "localhost:9092"),
        );
        bus_map.insert(
            "topic".to_string(),
            get("BEHOVSAMLER_TOPIC", "helse-behov-v1"),
        );
        bus_map.insert(
            "group.id".to_string(),
            get("BEHOVSAMLER_GROUP", "behovsamler-v1"),
        );
        bus_map.insert(
            "commit.interval.ms".to_string(),
            get("BEHOVSAMLER_COMMIT_INTERVAL_MS", "1000"),
        );
        if let Some(username) = vars.get("SERVICE_USERNAME") {
            bus_map.insert("service.username".to_string(), username.clone());
        }
        if let Some(password) = vars.get("SERVICE_PASSWORD") {
            bus_map.insert("service.password".to_string(), password.clone());
        }

        let bus = BusConfig::from_config_map(&bus_map)?;

        let state_dir = get("BEHOVSAMLER_STATE_DIR", "./data/state");

        let partitions = get("BEHOVSAMLER_PARTITIONS", "8")
            .parse::<u32>()
            .map_err(|e| LogError::Config(format!("invalid BEHOVSAMLER_PARTITIONS: {e}")))?;
        if partitions == 0 {
            return Err(
                LogError::Config("BEHOVSAMLER_PARTITIONS must be greater than zero".to_string())
                    .into(),
            );
        }

        Ok(Self {
            bus,
            state_dir,
            partitions,
        })
    }
}
