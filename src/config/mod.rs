//! Application configuration.
//!
//! Loaded from YAML files and `EOS__`-prefixed environment variables.
//! The broker components never read configuration themselves; the binary
//! hands them the plain structures defined here.

mod server;

use std::collections::BTreeMap;

use serde::Deserialize;

pub use server::{
    FilterMode, HttpConfig, UdpConfig, DEFAULT_BUFFER_SIZE, DEFAULT_PACKET_SIZE,
    DEFAULT_QUEUE_CAPACITY,
};

use crate::auth::RealmSecretTable;
use crate::encoding::key::is_realm;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "eos.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "EOS_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "EOS";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "EOS_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Realm -> shared secret.
    pub realms: BTreeMap<String, String>,
    /// UDP ingestion.
    pub udp: UdpConfig,
    /// WebSocket subscribers and `/stat`.
    pub http: HttpConfig,
    /// Seconds between periodic stats log lines; 0 disables.
    pub stats_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            realms: BTreeMap::new(),
            udp: UdpConfig::default(),
            http: HttpConfig::default(),
            stats_interval_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Sources, later overriding earlier:
    /// 1. `eos.yaml` in the current directory (if present)
    /// 2. File given by `path` (required if provided)
    /// 3. File named by `EOS_CONFIG` (required if set)
    /// 4. `EOS__SECTION__KEY` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document, without environment overlay.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, File, FileFormat};

        let config: Config = ConfigLib::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject realm names outside `[a-z0-9_-]+` and empty secrets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (realm, secret) in &self.realms {
            if !is_realm(realm) {
                return Err(ConfigError::Invalid(format!("bad realm name \"{}\"", realm)));
            }
            if secret.is_empty() {
                return Err(ConfigError::Invalid(format!("empty secret for realm {}", realm)));
            }
        }
        Ok(())
    }

    /// Build the read-only secret table for the authenticator.
    pub fn realm_table(&self) -> RealmSecretTable {
        self.realms
            .iter()
            .map(|(realm, secret)| (realm.clone(), secret.clone()))
            .collect()
    }
}
