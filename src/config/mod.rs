//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `PLATE_SYNC` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use plate_sync::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {}", config.server.socket_addr().unwrap());
//! ```

mod auth;
mod error;
mod server;
mod sync;

pub use auth::AuthConfig;
pub use error::{ConfigError, ValidationError};
pub use server::{Environment, ServerConfig};
pub use sync::SyncConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Handshake token verification
    pub auth: AuthConfig,

    /// Connection and fan-out settings
    #[serde(default)]
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `PLATE_SYNC` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `PLATE_SYNC__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `PLATE_SYNC__AUTH__JWT_SECRET=...` -> `auth.jwt_secret = ...`
    /// - `PLATE_SYNC__SYNC__HANDSHAKE_TIMEOUT_SECS=10` -> `sync.handshake_timeout_secs = 10`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("PLATE_SYNC")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.auth.validate(&self.server.environment)?;
        self.sync.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn set_minimal_env() {
        env::set_var("PLATE_SYNC__AUTH__JWT_SECRET", "dev-secret");
    }

    fn clear_env() {
        env::remove_var("PLATE_SYNC__AUTH__JWT_SECRET");
        env::remove_var("PLATE_SYNC__SERVER__PORT");
        env::remove_var("PLATE_SYNC__SERVER__ENVIRONMENT");
        env::remove_var("PLATE_SYNC__SYNC__HANDSHAKE_TIMEOUT_SECS");
        env::remove_var("PLATE_SYNC__SYNC__OUTBOUND_BUFFER");
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.handshake_timeout_secs, 15);
    }

    #[test]
    fn test_server_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
    }

    #[test]
    fn test_is_production() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("PLATE_SYNC__SERVER__ENVIRONMENT", "production");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_production());
        // The dev secret is too short for production
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sync_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("PLATE_SYNC__SYNC__HANDSHAKE_TIMEOUT_SECS", "5");
        env::set_var("PLATE_SYNC__SYNC__OUTBOUND_BUFFER", "16");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.sync.handshake_timeout_secs, 5);
        assert_eq!(config.sync.outbound_buffer, 16);
    }

    #[test]
    fn test_missing_secret_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        assert!(AppConfig::load().is_err());
    }
}
