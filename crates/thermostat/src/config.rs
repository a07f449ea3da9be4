//! Thermostat server configuration.

use live_runtime::config::{ConfigError, RuntimeConfig};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Default HTTP listener.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default static file directory.
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Thermostat server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listener for pages, websocket, health and metrics.
    pub bind_address: String,

    /// Directory served under `/static`.
    pub static_dir: PathBuf,

    /// Session runtime settings.
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let runtime = RuntimeConfig::from_vars(vars)?;

        let bind_address = vars
            .get("LIVE_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let static_dir = vars
            .get("LIVE_STATIC_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR), PathBuf::from);

        Ok(Config {
            bind_address,
            static_dir,
            runtime,
        })
    }
}
