//! AccountDirectory port - linked chat/mail accounts and their credentials.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::domain::foundation::{AccountId, UserId};
use crate::domain::sync::Provider;

use super::StoreError;

/// OAuth credentials for an external account.
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
}

impl AccountCredentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            refresh_token: None,
        }
    }
}

/// A chat or mail account linked by a user.
#[derive(Debug, Clone)]
pub struct ExternalAccount {
    pub id: AccountId,
    pub provider: Provider,
    pub owner: UserId,
    pub name: String,
    /// `None` until the user completes the provider's OAuth flow.
    pub credentials: Option<AccountCredentials>,
    pub archived: bool,
}

impl ExternalAccount {
    pub fn new(provider: Provider, owner: UserId, name: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            provider,
            owner,
            name: name.into(),
            credentials: None,
            archived: false,
        }
    }

    pub fn with_credentials(mut self, credentials: AccountCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner == user
    }
}

/// Looks up external accounts; the credentials provider for adapters.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn account(&self, id: &AccountId) -> Result<Option<ExternalAccount>, StoreError>;
}
