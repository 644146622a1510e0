//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid socket address: {0}")]
    InvalidSocketAddr(String),

    #[error("Sync path must start with '/' and name a route: {0:?}")]
    InvalidSyncPath(String),

    #[error("JWT secret must be at least {0} bytes in production")]
    WeakJwtSecret(usize),

    #[error("Handshake timeout must be between 1 and 120 seconds")]
    InvalidHandshakeTimeout,

    #[error("Outbound buffer must be greater than zero")]
    InvalidOutboundBuffer,
}
