//! Listener settings for the sync endpoint.

use serde::Deserialize;
use std::net::SocketAddr;

use super::error::ValidationError;

/// Where plate-sync accepts WebSocket clients and how it logs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Interface the sync listener binds.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Route clients upgrade on. Must start with `/`.
    #[serde(default = "default_sync_path")]
    pub sync_path: String,

    /// Deployment stage. Production switches logs to JSON and demands a
    /// strong token secret.
    #[serde(default)]
    pub environment: Environment,

    /// Fallback filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Deployment stage.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl ServerConfig {
    /// Address the sync listener binds.
    pub fn socket_addr(&self) -> Result<SocketAddr, ValidationError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse()
            .map_err(|_| ValidationError::InvalidSocketAddr(raw))
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if !self.sync_path.starts_with('/') || self.sync_path.len() < 2 {
            return Err(ValidationError::InvalidSyncPath(self.sync_path.clone()));
        }
        self.socket_addr()?;
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sync_path: default_sync_path(),
            environment: Environment::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_sync_path() -> String {
    "/sync".to_string()
}

fn default_log_level() -> String {
    "info,plate_sync=debug,tower_http=info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_defaults_to_all_interfaces_on_sync_route() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:8080");
        assert_eq!(config.sync_path, "/sync");
        assert!(!config.is_production());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loopback_listener_binds_loopback() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 4100,
            ..Default::default()
        };
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:4100");
    }

    #[test]
    fn unparseable_host_fails_validation() {
        let config = ServerConfig {
            host: "kitchen tablet".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidSocketAddr(_))
        ));
    }

    #[test]
    fn port_zero_fails_validation() {
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidPort)));
    }

    #[test]
    fn sync_path_must_be_absolute_and_named() {
        for path in ["sync", "/", ""] {
            let config = ServerConfig {
                sync_path: path.to_string(),
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ValidationError::InvalidSyncPath(_))
            ));
        }
    }

    #[test]
    fn stage_names_deserialize_lowercase() {
        let stage: Environment = serde_json::from_str("\"production\"").unwrap();
        assert_eq!(stage, Environment::Production);
        assert!(serde_json::from_str::<Environment>("\"Prod\"").is_err());
    }
}
