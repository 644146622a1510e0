//! StreamingProvider port - external chat and mail streaming clients.
//!
//! The sync core wraps these sessions in per-connection adapters but never
//! speaks the providers' protocols itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::sync::Provider;

use super::{AccountCredentials, ExternalAccount};

/// Something that happened on the provider side (a chat message, new mail).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub kind: String,
    pub payload: serde_json::Value,
}

impl ProviderEvent {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Errors reported by provider clients.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider handshake failed: {0}")]
    Handshake(String),

    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider session closed")]
    Closed,
}

/// Factory for streaming sessions to one provider.
#[async_trait]
pub trait StreamingProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Opens a session and completes the provider-side handshake.
    ///
    /// Events observed on the session are pushed into `events` until the
    /// session is stopped.
    async fn connect(
        &self,
        account: &ExternalAccount,
        credentials: &AccountCredentials,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<Box<dyn StreamingSession>, ProviderError>;
}

/// A live session with a provider.
#[async_trait]
pub trait StreamingSession: Send + Sync {
    /// Posts a message to a channel or thread. Not idempotent.
    async fn send_message(&self, channel_or_thread_id: &str, message: &str) -> Result<(), ProviderError>;

    /// Closes the session.
    async fn stop(&self) -> Result<(), ProviderError>;
}
