//! HS256 JWT adapter for handshake token verification.
//!
//! Implements the `CredentialVerifier` port against a shared secret:
//!
//! 1. Validate the signature with the configured secret
//! 2. Validate expiry, and issuer/audience when configured
//! 3. Map `sub` (and optional `name`) to the domain `AuthenticatedUser`

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::domain::foundation::{AuthError, AuthenticatedUser, UserId};
use crate::ports::CredentialVerifier;

/// JWT claims accepted on the handshake.
#[derive(Debug, Serialize, Deserialize)]
struct SyncClaims {
    /// Subject - the user ID
    sub: String,

    /// Expiry timestamp (Unix epoch seconds)
    exp: i64,

    /// User's display name
    #[serde(default)]
    name: Option<String>,
}

/// Verifies HS256-signed handshake tokens.
pub struct JwtCredentialVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtCredentialVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let mut verifier = Self::new(config.jwt_secret.expose_secret().as_bytes())
            .with_leeway(config.leeway_secs);
        if let Some(issuer) = &config.issuer {
            verifier = verifier.with_issuer(issuer);
        }
        if let Some(audience) = &config.audience {
            verifier = verifier.with_audience(audience);
        }
        verifier
    }

    /// Requires the `iss` claim to match.
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    /// Requires the `aud` claim to contain `audience`.
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self
    }

    /// Clock skew tolerated on `exp`, in seconds.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.validation.leeway = seconds;
        self
    }
}

#[async_trait]
impl CredentialVerifier for JwtCredentialVerifier {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token);

        let claims = decode::<SyncClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                use jsonwebtoken::errors::ErrorKind;
                match e.kind() {
                    ErrorKind::ExpiredSignature => {
                        tracing::debug!("Token expired");
                        AuthError::TokenExpired
                    }
                    ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => {
                        tracing::warn!("Token issued for another service: {}", e);
                        AuthError::InvalidToken
                    }
                    _ => {
                        tracing::debug!("Token validation failed: {}", e);
                        AuthError::InvalidToken
                    }
                }
            })?
            .claims;

        let user_id = UserId::new(&claims.sub).map_err(|_| {
            tracing::warn!("Invalid user ID in token: {:?}", claims.sub);
            AuthError::InvalidToken
        })?;

        Ok(AuthenticatedUser::new(user_id, claims.name))
    }
}

impl std::fmt::Debug for JwtCredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtCredentialVerifier")
            .field("issuer", &self.validation.iss)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}
