//! Authentication types for the domain layer.
//!
//! `AuthenticatedUser` is what a connection's handshake binds to; any
//! credential verifier (JWT, mock) can populate it via the
//! `CredentialVerifier` port.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::UserId;

/// Principal bound to a connection after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// The unique user identifier from the credential.
    pub id: UserId,

    /// Display name if the credential carried one.
    pub display_name: Option<String>,
}

impl AuthenticatedUser {
    /// Creates a new authenticated user.
    pub fn new(id: UserId, display_name: Option<String>) -> Self {
        Self { id, display_name }
    }

    /// Public identity attached to events this user originates.
    pub fn originator(&self) -> Originator {
        Originator {
            id: self.id.clone(),
            name: self.display_name.clone(),
        }
    }
}

/// Public identity of the principal that caused a state change.
///
/// Every mutation payload carries one as `from` so receivers can
/// recognise their own changes coming back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Originator {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Authentication errors that can occur during the handshake.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The token is missing, malformed, or has an invalid signature.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The verifier could not be reached.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn originator_copies_identity() {
        let user = AuthenticatedUser::new(UserId::new("u-1").unwrap(), Some("Ada".into()));
        let from = user.originator();
        assert_eq!(from.id.as_str(), "u-1");
        assert_eq!(from.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn originator_omits_missing_name() {
        let from = Originator {
            id: UserId::new("u-2").unwrap(),
            name: None,
        };
        let json = serde_json::to_string(&from).unwrap();
        assert_eq!(json, r#"{"id":"u-2"}"#);
    }
}
