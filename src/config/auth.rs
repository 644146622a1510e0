//! Authentication configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Shortest HS256 secret accepted in production.
const MIN_PRODUCTION_SECRET_LEN: usize = 32;

/// Handshake token verification (HS256 JWT)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared signing secret
    pub jwt_secret: Secret<String>,

    /// Expected `iss` claim, if any
    #[serde(default)]
    pub issuer: Option<String>,

    /// Expected `aud` claim, if any
    #[serde(default)]
    pub audience: Option<String>,

    /// Clock skew tolerated on `exp`, in seconds
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: Secret::new(jwt_secret.into()),
            issuer: None,
            audience: None,
            leeway_secs: default_leeway(),
        }
    }

    /// Validate authentication configuration
    ///
    /// The secret must be present; production additionally requires a
    /// secret long enough for HS256.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let secret = self.jwt_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"));
        }
        if *environment == Environment::Production && secret.len() < MIN_PRODUCTION_SECRET_LEN {
            return Err(ValidationError::WeakJwtSecret(MIN_PRODUCTION_SECRET_LEN));
        }
        Ok(())
    }
}

fn default_leeway() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_defaults() {
        let config = AuthConfig::new("secret");
        assert_eq!(config.leeway_secs, 30);
        assert!(config.issuer.is_none());
    }

    #[test]
    fn test_validation_missing_secret() {
        let config = AuthConfig::new("");
        assert!(matches!(
            config.validate(&Environment::Development),
            Err(ValidationError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_validation_production_requires_long_secret() {
        let config = AuthConfig::new("short-dev-secret");
        // Allowed in development
        assert!(config.validate(&Environment::Development).is_ok());
        // Rejected in production
        assert!(config.validate(&Environment::Production).is_err());

        let config = AuthConfig::new("x".repeat(MIN_PRODUCTION_SECRET_LEN));
        assert!(config.validate(&Environment::Production).is_ok());
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let config = AuthConfig::new("hunter2-hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
