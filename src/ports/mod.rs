//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the sync core and its collaborators. Adapters implement these ports.
//!
//! - `CredentialVerifier` - Handshake token verification
//! - `DocumentStore` - Board/team/item persistence by id
//! - `AccountDirectory` - Linked chat/mail accounts and credentials
//! - `StreamingProvider` / `StreamingSession` - External streaming clients
//! - `SyncPublisher` - Fan-out of state-change events

mod account_directory;
mod credential_verifier;
mod document_store;
mod streaming_provider;
mod sync_publisher;

pub use account_directory::{AccountCredentials, AccountDirectory, ExternalAccount};
pub use credential_verifier::CredentialVerifier;
pub use document_store::{DocumentStore, StoreError};
pub use streaming_provider::{ProviderError, ProviderEvent, StreamingProvider, StreamingSession};
pub use sync_publisher::{DispatchReport, SyncPublisher};
