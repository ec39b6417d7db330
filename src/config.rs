//! Configuration management
//!
//! Startup configuration for the file service, loaded from `config.toml`
//! with environment overrides. All values are fixed for the lifetime of the
//! process; in particular the admission slot capacities are static, not
//! resized at runtime.

use config::{Config, Environment, File};
use serde::Deserialize;

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind the listener
    pub bind_address: String,

    /// Port for the listener
    pub port: u16,

    /// Directory holding all stored files (flat namespace)
    pub storage_root: String,

    /// Maximum concurrent upload/download operations
    pub transfer_slots: usize,

    /// Maximum concurrent listing operations
    pub list_slots: usize,

    /// Size in bytes of each download chunk
    pub chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5051,
            storage_root: "./storage".to_string(),
            transfer_slots: 10,
            list_slots: 100,
            chunk_size: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Load configuration from config.toml with environment overrides.
    ///
    /// The file is optional; missing keys fall back to the defaults above.
    /// Environment variables use the `FILEDOCK` prefix, e.g.
    /// `FILEDOCK_STORAGE_ROOT`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = ServerConfig::default();

        let settings = Config::builder()
            .set_default("bind_address", defaults.bind_address)?
            .set_default("port", defaults.port as i64)?
            .set_default("storage_root", defaults.storage_root)?
            .set_default("transfer_slots", defaults.transfer_slots as i64)?
            .set_default("list_slots", defaults.list_slots as i64)?
            .set_default("chunk_size", defaults.chunk_size as i64)?
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("FILEDOCK"))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Address the listener binds to
    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Validation for all configuration values
    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.port == 0 {
            return Err(config::ConfigError::Message("port cannot be 0".into()));
        }

        if self.storage_root.is_empty() {
            return Err(config::ConfigError::Message(
                "storage_root cannot be empty".into(),
            ));
        }

        if self.transfer_slots == 0 {
            return Err(config::ConfigError::Message(
                "transfer_slots must be greater than 0".into(),
            ));
        }

        if self.list_slots == 0 {
            return Err(config::ConfigError::Message(
                "list_slots must be greater than 0".into(),
            ));
        }

        if self.chunk_size == 0 {
            return Err(config::ConfigError::Message(
                "chunk_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
