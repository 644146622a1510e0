//! Mock credential verifier for testing.
//!
//! Implements the `CredentialVerifier` port from a fixed token map, so
//! tests can authenticate connections without minting real tokens.
//!
//! # Example
//!
//! ```ignore
//! use plate_sync::adapters::auth::MockCredentialVerifier;
//!
//! let verifier = MockCredentialVerifier::new().with_test_user("token-a", "user-a");
//! let user = verifier.verify("token-a").await?;
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, AuthenticatedUser, UserId};
use crate::ports::CredentialVerifier;

/// Mock credential verifier for testing.
///
/// Stores a map of tokens to users. Tokens not in the map return `InvalidToken`.
#[derive(Debug, Default)]
pub struct MockCredentialVerifier {
    /// Map of valid tokens to their associated users
    tokens: RwLock<HashMap<String, AuthenticatedUser>>,
    /// Optional error to return for all verifications (for error testing)
    force_error: RwLock<Option<AuthError>>,
}

impl MockCredentialVerifier {
    /// Creates a new empty mock verifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a valid token that maps to a user.
    pub fn with_user(self, token: impl Into<String>, user: AuthenticatedUser) -> Self {
        self.add_token(token, user);
        self
    }

    /// Adds a valid token for a user named after its id.
    pub fn with_test_user(self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let user = AuthenticatedUser::new(
            UserId::new(&user_id).unwrap(),
            Some(format!("Test User {}", user_id)),
        );
        self.with_user(token, user)
    }

    /// Forces all verifications to return the specified error.
    pub fn with_error(self, error: AuthError) -> Self {
        *self.force_error.write().unwrap() = Some(error);
        self
    }

    /// Registers a new valid token at runtime.
    pub fn add_token(&self, token: impl Into<String>, user: AuthenticatedUser) {
        self.tokens.write().unwrap().insert(token.into(), user);
    }

    /// Removes a token, making it invalid.
    pub fn remove_token(&self, token: &str) {
        self.tokens.write().unwrap().remove(token);
    }
}

#[async_trait]
impl CredentialVerifier for MockCredentialVerifier {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        if let Some(error) = self.force_error.read().unwrap().clone() {
            return Err(error);
        }

        self.tokens
            .read()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_resolves_user() {
        let verifier = MockCredentialVerifier::new().with_test_user("tok", "u-1");

        let user = verifier.verify("tok").await.unwrap();

        assert_eq!(user.id.as_str(), "u-1");
        assert_eq!(user.display_name.as_deref(), Some("Test User u-1"));
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let verifier = MockCredentialVerifier::new();
        assert_eq!(verifier.verify("nope").await, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn removed_token_stops_working() {
        let verifier = MockCredentialVerifier::new().with_test_user("tok", "u-1");
        verifier.remove_token("tok");
        assert!(verifier.verify("tok").await.is_err());
    }

    #[tokio::test]
    async fn forced_error_wins() {
        let verifier = MockCredentialVerifier::new()
            .with_test_user("tok", "u-1")
            .with_error(AuthError::ServiceUnavailable("down".into()));

        assert_eq!(
            verifier.verify("tok").await,
            Err(AuthError::ServiceUnavailable("down".into()))
        );
    }
}
