//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, principals, and error types that form the
//! vocabulary of the sync core.

mod auth;
mod errors;
mod ids;
mod timestamp;

pub use auth::{AuthError, AuthenticatedUser, Originator};
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{AccountId, BoardId, ColumnId, ConnectionId, ItemId, TeamId, UserId};
pub use timestamp::Timestamp;
