//! CredentialVerifier port - handshake credential validation.
//!
//! A connection presents a bearer token as its first message; the
//! verifier turns it into the principal the connection is bound to.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser};

/// Validates bearer credentials presented during the handshake.
///
/// # Contract
///
/// Implementations must:
/// - Return `AuthError::InvalidToken` for malformed or badly signed tokens
/// - Return `AuthError::TokenExpired` for expired tokens
/// - Return `AuthError::ServiceUnavailable` for transient errors
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verify a raw bearer token (without any "Bearer " prefix).
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}
