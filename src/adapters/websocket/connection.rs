//! Server-side state for one live client connection.
//!
//! A `Connection` is created unauthenticated when a socket opens, binds a
//! principal exactly once during the handshake, and is marked closed
//! exactly once when the transport goes away.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio::sync::{mpsc, Mutex, OnceCell};

use crate::domain::foundation::{AccountId, AuthenticatedUser, ConnectionId, UserId};
use crate::domain::sync::Scope;

use super::adapter_manager::AdapterHandle;
use super::messages::ServerMessage;

/// Slot holding at most one adapter per account.
pub(super) type AdapterSlot = Arc<OnceCell<Arc<AdapterHandle>>>;

/// Why a message could not be queued for a connection.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    Full,

    #[error("connection is closed")]
    Closed,
}

/// One live client connection.
pub struct Connection {
    id: ConnectionId,
    principal: OnceLock<AuthenticatedUser>,
    outbound: mpsc::Sender<ServerMessage>,
    closed: AtomicBool,

    /// Scopes this connection is registered under. Only mutated while the
    /// registry's write lock is held, so it always mirrors the registry.
    pub(super) listening: Mutex<HashSet<Scope>>,

    /// External adapters owned by this connection, keyed by account.
    pub(super) adapters: Mutex<HashMap<AccountId, AdapterSlot>>,
}

impl Connection {
    /// Creates a connection writing into `outbound`.
    pub fn new(outbound: mpsc::Sender<ServerMessage>) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(),
            principal: OnceLock::new(),
            outbound,
            closed: AtomicBool::new(false),
            listening: Mutex::new(HashSet::new()),
            adapters: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a connection with a bounded outbound queue of `capacity`.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The bound principal, once the handshake has succeeded.
    pub fn principal(&self) -> Option<&AuthenticatedUser> {
        self.principal.get()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.principal().map(|user| &user.id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.get().is_some()
    }

    /// Binds the principal. Returns false if one was already bound.
    pub fn bind_principal(&self, user: AuthenticatedUser) -> bool {
        self.principal.set(user).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the connection closed. Returns true only for the first caller.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Queues a message without waiting.
    ///
    /// Used for fan-out: a slow or dead receiver must never hold up
    /// delivery to anyone else.
    pub fn try_deliver(&self, message: impl Into<ServerMessage>) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.outbound.try_send(message.into()).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Queues a direct reply, waiting for queue space.
    pub async fn reply(&self, message: impl Into<ServerMessage>) -> Result<(), DeliveryError> {
        self.outbound
            .send(message.into())
            .await
            .map_err(|_| DeliveryError::Closed)
    }

    /// Snapshot of the scopes this connection listens on.
    pub async fn listening(&self) -> HashSet<Scope> {
        self.listening.lock().await.clone()
    }

    pub async fn is_listening(&self, scope: &Scope) -> bool {
        self.listening.lock().await.contains(scope)
    }

    /// Number of constructed adapters that have not been stopped.
    pub async fn live_adapter_count(&self) -> usize {
        self.adapters
            .lock()
            .await
            .values()
            .filter_map(|slot| slot.get())
            .filter(|handle| !handle.is_stopped())
            .count()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::websocket::messages::ConnectionNotice;

    fn pong() -> ConnectionNotice {
        ConnectionNotice::Pong {
            timestamp: "now".to_string(),
        }
    }

    #[test]
    fn principal_binds_once() {
        let (conn, _rx) = Connection::channel(4);
        assert!(!conn.is_authenticated());

        let first = AuthenticatedUser::new(UserId::new("u-1").unwrap(), None);
        let second = AuthenticatedUser::new(UserId::new("u-2").unwrap(), None);

        assert!(conn.bind_principal(first));
        assert!(!conn.bind_principal(second));
        assert_eq!(conn.user_id().unwrap().as_str(), "u-1");
    }

    #[test]
    fn mark_closed_reports_first_caller_only() {
        let (conn, _rx) = Connection::channel(4);
        assert!(conn.mark_closed());
        assert!(!conn.mark_closed());
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn try_deliver_reports_full_queue() {
        let (conn, mut rx) = Connection::channel(1);

        assert_eq!(conn.try_deliver(pong()), Ok(()));
        assert_eq!(conn.try_deliver(pong()), Err(DeliveryError::Full));

        assert!(rx.recv().await.is_some());
        assert_eq!(conn.try_deliver(pong()), Ok(()));
    }

    #[tokio::test]
    async fn try_deliver_after_close_fails() {
        let (conn, rx) = Connection::channel(4);
        drop(rx);
        assert_eq!(conn.try_deliver(pong()), Err(DeliveryError::Closed));

        let (conn, _rx) = Connection::channel(4);
        conn.mark_closed();
        assert_eq!(conn.try_deliver(pong()), Err(DeliveryError::Closed));
    }
}
