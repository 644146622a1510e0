//! Per-connection driver: handshake, command dispatch, and teardown.
//!
//! The driver is transport-agnostic. It reads decoded [`ClientMessage`]s
//! from a channel and writes [`ServerMessage`]s through its [`Connection`],
//! so the same code runs behind the axum socket and in tests.
//!
//! # Lifecycle
//!
//! 1. Wait for `authenticate` (bounded by the handshake timeout)
//! 2. Bind the principal and reply `authenticated`
//! 3. Handle commands until the inbound channel closes
//! 4. Tear down exactly once: registry entries and adapters released

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::application::access;
use crate::application::handlers::ItemService;
use crate::config::SyncConfig;
use crate::domain::foundation::{
    AccountId, AuthError, AuthenticatedUser, BoardId, DomainError, ErrorCode, TeamId, Timestamp,
};
use crate::domain::sync::{Provider, Scope};
use crate::ports::{AccountDirectory, CredentialVerifier, DocumentStore, StreamingProvider};

use super::adapter_manager::{AdapterError, ExternalAdapterManager};
use super::connection::Connection;
use super::dispatcher::EventDispatcher;
use super::messages::{ClientMessage, ConnectionNotice, ServerMessage};
use super::registry::ConnectionRegistry;

/// Timing and buffering for every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub handshake_timeout: Duration,
    pub outbound_buffer: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(15),
            outbound_buffer: 64,
        }
    }
}

impl From<&SyncConfig> for ConnectionSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            handshake_timeout: config.handshake_timeout(),
            outbound_buffer: config.outbound_buffer,
        }
    }
}

/// Shared services every connection driver works against.
#[derive(Clone)]
pub struct SyncState {
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<EventDispatcher>,
    pub adapters: Arc<ExternalAdapterManager>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub store: Arc<dyn DocumentStore>,
    pub items: Arc<ItemService>,
    pub settings: ConnectionSettings,
}

impl SyncState {
    /// Wires the registry, dispatcher, adapter manager, and item service
    /// around the given collaborators.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        accounts: Arc<dyn AccountDirectory>,
        verifier: Arc<dyn CredentialVerifier>,
        providers: Vec<Arc<dyn StreamingProvider>>,
        settings: ConnectionSettings,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(EventDispatcher::new(registry.clone()));
        let adapters = providers.into_iter().fold(
            ExternalAdapterManager::new(accounts, registry.clone())
                .with_event_buffer(settings.outbound_buffer),
            ExternalAdapterManager::with_provider,
        );
        let items = Arc::new(ItemService::new(store.clone(), dispatcher.clone()));

        Self {
            registry,
            dispatcher,
            adapters: Arc::new(adapters),
            verifier,
            store,
            items,
            settings,
        }
    }
}

/// Why a connection never got past the handshake.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("No authenticate message within {0:?}")]
    TimedOut(Duration),

    #[error("Transport closed before authenticating")]
    Disconnected,

    #[error("Expected authenticate, got {0}")]
    UnexpectedMessage(&'static str),

    #[error(transparent)]
    Rejected(#[from] AuthError),
}

impl HandshakeError {
    /// Rejections get an `unauthorized` reply; timeouts and hang-ups close
    /// without one.
    fn warrants_reply(&self) -> bool {
        matches!(
            self,
            HandshakeError::UnexpectedMessage(_) | HandshakeError::Rejected(_)
        )
    }
}

/// How a driver finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverExit {
    /// Authenticated session ended and was torn down.
    Closed,
    /// Never authenticated; nothing was registered.
    HandshakeFailed(HandshakeError),
}

/// Runs one connection from handshake to teardown.
pub struct ConnectionDriver {
    state: SyncState,
    connection: Arc<Connection>,
}

impl ConnectionDriver {
    pub fn new(state: SyncState, connection: Arc<Connection>) -> Self {
        Self { state, connection }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub async fn run(self, mut inbound: mpsc::Receiver<ClientMessage>) -> DriverExit {
        let user = match self.handshake(&mut inbound).await {
            Ok(user) => user,
            Err(err) => {
                tracing::info!(
                    connection_id = %self.connection.id(),
                    error = %err,
                    "Handshake failed"
                );
                if err.warrants_reply() {
                    let _ = self
                        .connection
                        .reply(ConnectionNotice::Unauthorized {
                            reason: err.to_string(),
                        })
                        .await;
                }
                self.connection.mark_closed();
                return DriverExit::HandshakeFailed(err);
            }
        };

        self.connection.bind_principal(user.clone());
        self.reply(ConnectionNotice::Authenticated {
            user_id: user.id.clone(),
            connection_id: self.connection.id(),
        })
        .await;
        tracing::info!(
            connection_id = %self.connection.id(),
            user_id = %user.id,
            "Client authenticated"
        );

        while let Some(message) = inbound.recv().await {
            if self.connection.is_closed() {
                break;
            }
            self.handle(&user, message).await;
        }

        teardown(&self.state, &self.connection).await;
        DriverExit::Closed
    }

    async fn handshake(
        &self,
        inbound: &mut mpsc::Receiver<ClientMessage>,
    ) -> Result<AuthenticatedUser, HandshakeError> {
        let timeout = self.state.settings.handshake_timeout;
        let first = tokio::time::timeout(timeout, inbound.recv())
            .await
            .map_err(|_| HandshakeError::TimedOut(timeout))?;

        match first {
            None => Err(HandshakeError::Disconnected),
            Some(ClientMessage::Authenticate { token }) => {
                Ok(self.state.verifier.verify(&token).await?)
            }
            Some(other) => Err(HandshakeError::UnexpectedMessage(other.name())),
        }
    }

    async fn handle(&self, user: &AuthenticatedUser, message: ClientMessage) {
        let name = message.name();
        let items = &self.state.items;

        let result: Result<(), DomainError> = match message {
            ClientMessage::Authenticate { .. } => {
                tracing::debug!(connection_id = %self.connection.id(), "Repeat authenticate ignored");
                Ok(())
            }
            ClientMessage::Ping {} => {
                self.reply(ConnectionNotice::Pong {
                    timestamp: Timestamp::now().to_rfc3339(),
                })
                .await;
                Ok(())
            }
            ClientMessage::ListenForUserEvents {} => {
                self.state.registry.register_user(&user.id, &self.connection).await;
                self.state
                    .registry
                    .register(Scope::User(user.id.clone()), &self.connection)
                    .await;
                Ok(())
            }
            ClientMessage::ListenForTeamEvents { team_id } => self.listen_for_team(user, team_id).await,
            ClientMessage::ListenForBoardEvents { board_id } => {
                self.listen_for_board(user, board_id).await
            }
            ClientMessage::StopListeningForBoardEvents { board_id } => {
                self.state
                    .registry
                    .unregister(&Scope::Board(board_id), &self.connection)
                    .await;
                Ok(())
            }
            ClientMessage::ListenForChatEvents { account_id } => {
                self.listen_for_account(Provider::Chat, account_id).await;
                Ok(())
            }
            ClientMessage::ListenForMailEvents { account_id } => {
                self.listen_for_account(Provider::Mail, account_id).await;
                Ok(())
            }
            ClientMessage::ChatSendMessage {
                account_id,
                channel_or_thread_id,
                message,
            } => self
                .send_provider_message(Provider::Chat, account_id, &channel_or_thread_id, &message)
                .await
                .map_err(DomainError::from),
            ClientMessage::MailSendMessage {
                account_id,
                channel_or_thread_id,
                message,
            } => self
                .send_provider_message(Provider::Mail, account_id, &channel_or_thread_id, &message)
                .await
                .map_err(DomainError::from),
            ClientMessage::AddItem {
                board_id,
                column_id,
                pos,
                title,
            } => items
                .add_item(user, board_id, column_id, pos, title)
                .await
                .map(|_| ()),
            ClientMessage::EditItem { item_id, title } => {
                items.edit_item(user, item_id, title).await.map(|_| ())
            }
            ClientMessage::MoveItem {
                item_id,
                to_board_id,
                to_column_id,
                to_pos,
            } => items
                .move_item(user, item_id, to_board_id, to_column_id, to_pos)
                .await
                .map(|_| ()),
            ClientMessage::RemoveItem { item_id } => items.remove_item(user, item_id).await.map(|_| ()),
            ClientMessage::ReopenItem { item_id } => items.reopen_item(user, item_id).await.map(|_| ()),
            ClientMessage::AddColumn { board_id, name } => {
                items.add_column(user, board_id, name).await.map(|_| ())
            }
            ClientMessage::RemoveColumn { board_id, column_id } => {
                items.remove_column(user, board_id, column_id).await
            }
        };

        if let Err(err) = result {
            tracing::warn!(
                connection_id = %self.connection.id(),
                user_id = %user.id,
                event = name,
                error = %err,
                "Command failed"
            );
            self.reply(ConnectionNotice::Error {
                code: err.code().to_string(),
                message: err.message.clone(),
            })
            .await;
        }
    }

    /// Unauthorized or unknown teams are ignored without a reply.
    async fn listen_for_team(&self, user: &AuthenticatedUser, team_id: TeamId) -> Result<(), DomainError> {
        match access::member_team(self.state.store.as_ref(), &user.id, team_id).await {
            Ok(_) => {
                self.state
                    .registry
                    .register(Scope::Team(team_id), &self.connection)
                    .await;
                Ok(())
            }
            Err(err) if is_access_denial(&err) => {
                tracing::debug!(user_id = %user.id, team_id = %team_id, "Team listen ignored");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn listen_for_board(&self, user: &AuthenticatedUser, board_id: BoardId) -> Result<(), DomainError> {
        match access::visible_board(self.state.store.as_ref(), &user.id, board_id).await {
            Ok(_) => {
                self.state
                    .registry
                    .register(Scope::Board(board_id), &self.connection)
                    .await;
                Ok(())
            }
            Err(err) if is_access_denial(&err) => {
                tracing::debug!(user_id = %user.id, board_id = %board_id, "Board listen ignored");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Failures surface as provider notices (or not at all for accounts the
    /// user does not own), never as command errors.
    async fn listen_for_account(&self, provider: Provider, account_id: AccountId) {
        match self
            .state
            .adapters
            .get_or_create(&self.connection, provider, account_id)
            .await
        {
            Ok(_) => {
                self.state
                    .registry
                    .register(Scope::Account(provider, account_id), &self.connection)
                    .await;
            }
            Err(err) => {
                tracing::debug!(
                    connection_id = %self.connection.id(),
                    account_id = %account_id,
                    provider = %provider,
                    error = %err,
                    "Account listen not established"
                );
            }
        }
    }

    async fn send_provider_message(
        &self,
        provider: Provider,
        account_id: AccountId,
        channel_or_thread_id: &str,
        message: &str,
    ) -> Result<(), AdapterError> {
        self.state
            .adapters
            .send_message(&self.connection, provider, account_id, channel_or_thread_id, message)
            .await
    }

    async fn reply(&self, notice: impl Into<ServerMessage>) {
        if let Err(err) = self.connection.reply(notice).await {
            tracing::debug!(connection_id = %self.connection.id(), error = %err, "Reply dropped");
        }
    }
}

fn is_access_denial(err: &DomainError) -> bool {
    matches!(
        err.code(),
        ErrorCode::Forbidden | ErrorCode::BoardNotFound | ErrorCode::TeamNotFound
    )
}

/// Releases everything a connection holds. Only the first call does any
/// work; later calls return false.
pub async fn teardown(state: &SyncState, connection: &Connection) -> bool {
    if !connection.mark_closed() {
        return false;
    }

    let scopes = state.registry.remove_connection(connection).await;
    let adapters = state.adapters.release_all(connection).await;

    tracing::info!(
        connection_id = %connection.id(),
        user_id = ?connection.user_id().map(|id| id.as_str()),
        scopes,
        adapters,
        "Connection closed"
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::MockCredentialVerifier;
    use crate::adapters::store::InMemoryDocumentStore;
    use crate::domain::board::{Board, Column};
    use crate::domain::foundation::UserId;

    struct Harness {
        state: SyncState,
        store: Arc<InMemoryDocumentStore>,
    }

    fn harness(handshake_timeout: Duration) -> Harness {
        let store = Arc::new(InMemoryDocumentStore::new());
        let verifier = Arc::new(MockCredentialVerifier::new().with_test_user("good", "u-1"));
        let state = SyncState::new(
            store.clone(),
            store.clone(),
            verifier,
            Vec::new(),
            ConnectionSettings {
                handshake_timeout,
                outbound_buffer: 16,
            },
        );
        Harness { state, store }
    }

    fn spawn_driver(
        state: &SyncState,
    ) -> (
        Arc<Connection>,
        mpsc::Sender<ClientMessage>,
        mpsc::Receiver<ServerMessage>,
        tokio::task::JoinHandle<DriverExit>,
    ) {
        let (connection, outbound) = Connection::channel(16);
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let driver = ConnectionDriver::new(state.clone(), connection.clone());
        let task = tokio::spawn(driver.run(inbound_rx));
        (connection, inbound_tx, outbound, task)
    }

    fn event_name(message: &ServerMessage) -> String {
        serde_json::to_value(message).unwrap()["event"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn handshake_binds_principal() {
        let h = harness(Duration::from_secs(5));
        let (conn, tx, mut rx, _task) = spawn_driver(&h.state);

        tx.send(ClientMessage::Authenticate { token: "good".into() })
            .await
            .unwrap();

        assert_eq!(event_name(&rx.recv().await.unwrap()), "authenticated");
        assert_eq!(conn.user_id().unwrap().as_str(), "u-1");
    }

    #[tokio::test]
    async fn bad_token_is_refused_and_closed() {
        let h = harness(Duration::from_secs(5));
        let (conn, tx, mut rx, task) = spawn_driver(&h.state);

        tx.send(ClientMessage::Authenticate { token: "bad".into() })
            .await
            .unwrap();

        assert_eq!(event_name(&rx.recv().await.unwrap()), "unauthorized");
        assert_eq!(
            task.await.unwrap(),
            DriverExit::HandshakeFailed(HandshakeError::Rejected(AuthError::InvalidToken))
        );
        assert!(conn.is_closed());
        assert!(!conn.is_authenticated());
    }

    #[tokio::test]
    async fn commands_before_authenticate_are_refused() {
        let h = harness(Duration::from_secs(5));
        let (_conn, tx, mut rx, task) = spawn_driver(&h.state);

        tx.send(ClientMessage::ListenForUserEvents {}).await.unwrap();

        assert_eq!(event_name(&rx.recv().await.unwrap()), "unauthorized");
        assert!(matches!(
            task.await.unwrap(),
            DriverExit::HandshakeFailed(HandshakeError::UnexpectedMessage("listen for user events"))
        ));
        assert!(h.state.registry.active_scopes().await.is_empty());
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let h = harness(Duration::from_millis(50));
        let (conn, _tx, mut rx, task) = spawn_driver(&h.state);

        assert!(matches!(
            task.await.unwrap(),
            DriverExit::HandshakeFailed(HandshakeError::TimedOut(_))
        ));
        assert!(rx.try_recv().is_err());
        assert!(conn.is_closed());
        assert!(h.state.registry.active_scopes().await.is_empty());
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let h = harness(Duration::from_secs(5));
        let (_conn, tx, mut rx, _task) = spawn_driver(&h.state);

        tx.send(ClientMessage::Authenticate { token: "good".into() })
            .await
            .unwrap();
        rx.recv().await.unwrap();
        tx.send(ClientMessage::Ping {}).await.unwrap();

        assert_eq!(event_name(&rx.recv().await.unwrap()), "pong");
    }

    #[tokio::test]
    async fn unauthorized_board_listen_is_ignored() {
        let h = harness(Duration::from_secs(5));
        let board = Board::new(UserId::new("someone-else").unwrap(), "Private", vec![Column::new("To do")]);
        let board_id = board.id;
        h.store.insert_board(board).await;
        let (conn, tx, mut rx, _task) = spawn_driver(&h.state);

        tx.send(ClientMessage::Authenticate { token: "good".into() })
            .await
            .unwrap();
        rx.recv().await.unwrap();
        tx.send(ClientMessage::ListenForBoardEvents { board_id }).await.unwrap();
        tx.send(ClientMessage::Ping {}).await.unwrap();

        // The pong arrives with nothing in front of it.
        assert_eq!(event_name(&rx.recv().await.unwrap()), "pong");
        assert!(!conn.is_listening(&Scope::Board(board_id)).await);
    }

    #[tokio::test]
    async fn teardown_runs_once_and_clears_registry() {
        let h = harness(Duration::from_secs(5));
        let board = Board::new(UserId::new("u-1").unwrap(), "Mine", vec![Column::new("To do")]);
        let board_id = board.id;
        h.store.insert_board(board).await;
        let (conn, tx, mut rx, task) = spawn_driver(&h.state);

        tx.send(ClientMessage::Authenticate { token: "good".into() })
            .await
            .unwrap();
        rx.recv().await.unwrap();
        tx.send(ClientMessage::ListenForUserEvents {}).await.unwrap();
        tx.send(ClientMessage::ListenForBoardEvents { board_id }).await.unwrap();
        tx.send(ClientMessage::Ping {}).await.unwrap();
        rx.recv().await.unwrap();
        assert!(conn.is_listening(&Scope::Board(board_id)).await);

        drop(tx);
        assert_eq!(task.await.unwrap(), DriverExit::Closed);

        assert!(h.state.registry.active_scopes().await.is_empty());
        assert_eq!(h.state.registry.connection_count().await, 0);
        assert!(!teardown(&h.state, &conn).await);
    }
}
