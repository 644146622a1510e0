//! Per-connection external streaming adapters.
//!
//! A connection that listens for chat or mail events on an account gets
//! one adapter wrapping a provider session. Construction is serialized
//! per (connection, account) through a `OnceCell`, so concurrent listen
//! requests share a single adapter instead of racing to build several.
//!
//! # Lifecycle
//!
//! ```text
//! listen for chat events
//!        │
//!        ▼
//!  load account ── not owned ──────────────► rejected
//!        │
//!        ├── no credentials ───────────────► "no chat for account"
//!        ▼
//!  provider.connect ── fails ──────────────► "chat socket unable to start"
//!        │
//!        ▼
//!  "chat authenticated", "chat socket ready", forward "chat event"s
//!        │
//!        ▼
//!  stopped on unlisten, account archival, or connection teardown
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use thiserror::Error;
use tokio::sync::{mpsc, Mutex, OnceCell};
use tokio::task::JoinHandle;

use crate::domain::foundation::{AccountId, DomainError, ErrorCode, UserId};
use crate::domain::sync::{Provider, Scope};
use crate::ports::{
    AccountDirectory, ProviderError, ProviderEvent, StoreError, StreamingProvider,
    StreamingSession,
};

use super::connection::{AdapterSlot, Connection};
use super::messages::ConnectionNotice;
use super::registry::ConnectionRegistry;

/// Default capacity of the provider → connection event channel.
const DEFAULT_EVENT_BUFFER: usize = 64;

/// Errors from adapter construction and use.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Connection is not authenticated")]
    Unauthenticated,

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    #[error("Account {0} is not owned by the requesting user")]
    NotOwner(AccountId),

    #[error("Account {0} belongs to a different provider")]
    ProviderMismatch(AccountId),

    #[error("Account {0} is archived")]
    Archived(AccountId),

    #[error("Account {0} has not been authorized")]
    NeedsAuthorization(AccountId),

    #[error("No {0} provider is configured")]
    ProviderUnavailable(Provider),

    #[error("No adapter for account {0}")]
    NoAdapter(AccountId),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AdapterError> for DomainError {
    fn from(err: AdapterError) -> Self {
        let code = match &err {
            AdapterError::Unauthenticated => ErrorCode::Unauthorized,
            AdapterError::NotOwner(_) | AdapterError::Archived(_) => ErrorCode::Forbidden,
            AdapterError::AccountNotFound(_) | AdapterError::NoAdapter(_) => {
                ErrorCode::AccountNotFound
            }
            AdapterError::Store(_) => ErrorCode::StoreError,
            _ => ErrorCode::InternalError,
        };
        DomainError::new(code, err.to_string())
    }
}

/// A live provider session owned by one connection.
pub struct AdapterHandle {
    account_id: AccountId,
    provider: Provider,
    authenticated: AtomicBool,
    stopped: AtomicBool,
    session: Box<dyn StreamingSession>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl AdapterHandle {
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Posts a message through the provider session.
    pub async fn send_message(&self, channel_or_thread_id: &str, message: &str) -> Result<(), ProviderError> {
        if self.is_stopped() {
            return Err(ProviderError::Closed);
        }
        self.session.send_message(channel_or_thread_id, message).await
    }

    /// Stops the session and the event forwarder. Runs at most once.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.authenticated.store(false, Ordering::Release);
        if let Some(forwarder) = self.forwarder.lock().await.take() {
            forwarder.abort();
        }
        self.session.stop().await
    }
}

impl std::fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("account_id", &self.account_id)
            .field("provider", &self.provider)
            .field("authenticated", &self.is_authenticated())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Creates, looks up, and tears down adapters for connections.
pub struct ExternalAdapterManager {
    accounts: Arc<dyn AccountDirectory>,
    providers: HashMap<Provider, Arc<dyn StreamingProvider>>,
    registry: Arc<ConnectionRegistry>,
    event_buffer: usize,
}

impl ExternalAdapterManager {
    pub fn new(accounts: Arc<dyn AccountDirectory>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            accounts,
            providers: HashMap::new(),
            registry,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Registers the client used for its provider.
    pub fn with_provider(mut self, client: Arc<dyn StreamingProvider>) -> Self {
        self.providers.insert(client.provider(), client);
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    /// Returns the connection's adapter for `account_id`, building it if
    /// none exists. Concurrent callers for the same key share one build.
    pub async fn get_or_create(
        &self,
        connection: &Arc<Connection>,
        provider: Provider,
        account_id: AccountId,
    ) -> Result<Arc<AdapterHandle>, AdapterError> {
        let principal = connection
            .user_id()
            .ok_or(AdapterError::Unauthenticated)?
            .clone();
        if connection.is_closed() {
            return Err(AdapterError::ConnectionClosed);
        }

        let slot = {
            let mut adapters = connection.adapters.lock().await;
            Arc::clone(adapters.entry(account_id).or_default())
        };

        let built = slot
            .get_or_try_init(|| self.build(connection, &principal, provider, account_id))
            .await
            .map(Arc::clone);

        match built {
            Ok(handle) => {
                if handle.provider() != provider {
                    return Err(AdapterError::ProviderMismatch(account_id));
                }
                if connection.is_closed() {
                    // Teardown ran while the session was being opened and
                    // may already have drained the slot.
                    self.forget_slot(connection, account_id, &slot).await;
                    self.registry
                        .unregister(&Scope::Account(provider, account_id), connection)
                        .await;
                    stop_handle(&handle).await;
                    return Err(AdapterError::ConnectionClosed);
                }
                Ok(handle)
            }
            Err(err) => {
                let mut adapters = connection.adapters.lock().await;
                let stale = adapters
                    .get(&account_id)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot) && current.get().is_none());
                if stale {
                    adapters.remove(&account_id);
                }
                Err(err)
            }
        }
    }

    /// Drops the map entry for `account_id` if it is still `slot`.
    async fn forget_slot(&self, connection: &Connection, account_id: AccountId, slot: &AdapterSlot) {
        let mut adapters = connection.adapters.lock().await;
        if adapters
            .get(&account_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            adapters.remove(&account_id);
        }
    }

    async fn build(
        &self,
        connection: &Arc<Connection>,
        principal: &UserId,
        provider: Provider,
        account_id: AccountId,
    ) -> Result<Arc<AdapterHandle>, AdapterError> {
        let account = self
            .accounts
            .account(&account_id)
            .await?
            .ok_or(AdapterError::AccountNotFound(account_id))?;

        if !account.is_owned_by(principal) {
            return Err(AdapterError::NotOwner(account_id));
        }
        if account.provider != provider {
            return Err(AdapterError::ProviderMismatch(account_id));
        }
        if account.archived {
            return Err(AdapterError::Archived(account_id));
        }

        let Some(credentials) = account.credentials.as_ref() else {
            notify(connection, ConnectionNotice::no_provider_for_account(provider, account_id));
            return Err(AdapterError::NeedsAuthorization(account_id));
        };

        let client = self
            .providers
            .get(&provider)
            .ok_or(AdapterError::ProviderUnavailable(provider))?;

        let (events_tx, events_rx) = mpsc::channel(self.event_buffer);
        let session = match client.connect(&account, credentials, events_tx).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    account_id = %account_id,
                    provider = %provider,
                    error = %err,
                    "Provider session failed to start"
                );
                notify(connection, ConnectionNotice::socket_unable_to_start(provider, account_id));
                return Err(err.into());
            }
        };

        let forwarder = tokio::spawn(forward_events(
            Arc::downgrade(connection),
            provider,
            account_id,
            events_rx,
        ));

        let handle = Arc::new(AdapterHandle {
            account_id,
            provider,
            authenticated: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            session,
            forwarder: Mutex::new(Some(forwarder)),
        });

        tracing::info!(
            connection_id = %connection.id(),
            account_id = %account_id,
            provider = %provider,
            "Provider adapter started"
        );
        notify(
            connection,
            ConnectionNotice::provider_authenticated(provider, account_id, account.name.clone()),
        );
        notify(connection, ConnectionNotice::socket_ready(provider, account_id));

        Ok(handle)
    }

    /// The connection's built adapter for `account_id`, if any.
    pub async fn get(&self, connection: &Connection, account_id: AccountId) -> Option<Arc<AdapterHandle>> {
        connection
            .adapters
            .lock()
            .await
            .get(&account_id)
            .and_then(|slot| slot.get().cloned())
    }

    /// Stops and forgets the connection's adapter for `account_id`, and
    /// stops the connection listening on that account.
    pub async fn destroy(&self, connection: &Connection, account_id: AccountId) -> bool {
        let slot = connection.adapters.lock().await.remove(&account_id);
        let Some(handle) = slot.and_then(|slot| slot.get().cloned()) else {
            return false;
        };

        self.registry
            .unregister(&Scope::Account(handle.provider(), account_id), connection)
            .await;
        stop_handle(&handle).await;
        true
    }

    /// Stops every adapter the connection owns. Part of teardown.
    pub async fn release_all(&self, connection: &Connection) -> usize {
        let slots: Vec<_> = connection.adapters.lock().await.drain().collect();
        let mut stopped = 0;
        for (_, slot) in slots {
            if let Some(handle) = slot.get() {
                stop_handle(handle).await;
                stopped += 1;
            }
        }
        stopped
    }

    /// Handles an account being archived: every connection listening on it
    /// is dropped from the scope and loses its adapter.
    pub async fn archive_account(&self, provider: Provider, account_id: AccountId) -> usize {
        let connections = self
            .registry
            .purge_scope(&Scope::Account(provider, account_id))
            .await;

        for connection in &connections {
            self.destroy(connection, account_id).await;
        }

        tracing::info!(
            account_id = %account_id,
            provider = %provider,
            connections = connections.len(),
            "Archived account adapters released"
        );
        connections.len()
    }

    /// Sends a message through the connection's adapter for `account_id`.
    pub async fn send_message(
        &self,
        connection: &Connection,
        provider: Provider,
        account_id: AccountId,
        channel_or_thread_id: &str,
        message: &str,
    ) -> Result<(), AdapterError> {
        let handle = self
            .get(connection, account_id)
            .await
            .filter(|handle| handle.provider() == provider)
            .ok_or(AdapterError::NoAdapter(account_id))?;

        handle.send_message(channel_or_thread_id, message).await?;
        Ok(())
    }
}

async fn stop_handle(handle: &AdapterHandle) {
    if let Err(err) = handle.stop().await {
        tracing::warn!(
            account_id = %handle.account_id(),
            provider = %handle.provider(),
            error = %err,
            "Provider session did not stop cleanly"
        );
    }
}

fn notify(connection: &Connection, notice: ConnectionNotice) {
    if let Err(err) = connection.try_deliver(notice) {
        tracing::debug!(connection_id = %connection.id(), error = %err, "Adapter notice dropped");
    }
}

async fn forward_events(
    connection: Weak<Connection>,
    provider: Provider,
    account_id: AccountId,
    mut events: mpsc::Receiver<ProviderEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(connection) = connection.upgrade() else {
            break;
        };
        if connection.is_closed() {
            break;
        }
        notify(&connection, ConnectionNotice::provider_event(provider, account_id, event));
    }
}
