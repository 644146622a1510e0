//! Authentication adapters.
//!
//! Implementations of the `CredentialVerifier` port:
//!
//! - `jwt` - HS256 shared-secret JWT verification
//! - `mock` - Test implementation backed by a token map

mod jwt;
mod mock;

pub use jwt::JwtCredentialVerifier;
pub use mock::MockCredentialVerifier;
