//! Event dispatcher fanning domain events out to connections.
//!
//! # Event Flow
//!
//! ```text
//! DomainEvent { scope, also, allow, payload }
//!          │
//!          ▼
//! ┌────────────────────────┐
//! │ resolve candidates     │  user scope → the user's connections
//! │ for every scope, once  │  otherwise  → the scope's listeners
//! └────────────────────────┘
//!          │
//!          ▼
//! ┌────────────────────────┐
//! │ filter: authenticated, │
//! │ admitted by allow list │
//! └────────────────────────┘
//!          │
//!          ▼
//! ┌────────────────────────┐
//! │ try_deliver to each    │  failures are logged, never propagated
//! └────────────────────────┘
//! ```
//!
//! The originator is not filtered out: its own clients receive the echo
//! and suppress it by comparing the payload's `from` with themselves.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::sync::{DomainEvent, Scope};
use crate::ports::{DispatchReport, SyncPublisher};

use super::connection::Connection;
use super::messages::ServerMessage;
use super::registry::ConnectionRegistry;

/// Routes domain events to the connections listening on their scope.
pub struct EventDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    async fn listeners(&self, scope: &Scope) -> Vec<Arc<Connection>> {
        let mut listeners = self.registry.listeners(scope).await;
        if let Scope::User(user) = scope {
            listeners.extend(self.registry.user_connection(user).await);
        }
        listeners
    }

    /// Listeners of every scope the event targets, each connection once.
    async fn candidates(&self, event: &DomainEvent) -> Vec<Arc<Connection>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for scope in event.scopes() {
            for connection in self.listeners(scope).await {
                if seen.insert(connection.id()) {
                    candidates.push(connection);
                }
            }
        }
        candidates
    }
}

#[async_trait]
impl SyncPublisher for EventDispatcher {
    async fn dispatch(&self, event: DomainEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        let message = ServerMessage::from(event.payload.clone());

        for connection in self.candidates(&event).await {
            let Some(user) = connection.user_id() else {
                report.filtered += 1;
                continue;
            };
            if !event.admits(user) {
                report.filtered += 1;
                continue;
            }

            match connection.try_deliver(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        connection_id = %connection.id(),
                        event = event.payload.name(),
                        error = %err,
                        "Failed to deliver sync event"
                    );
                }
            }
        }

        tracing::debug!(
            scope = %event.scope,
            event = event.payload.name(),
            delivered = report.delivered,
            filtered = report.filtered,
            failed = report.failed,
            "Sync event dispatched"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::board::Item;
    use crate::domain::foundation::{AuthenticatedUser, BoardId, ColumnId, Originator, TeamId, UserId};
    use crate::domain::sync::SyncEvent;
    use tokio::sync::mpsc;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn authed(id: &str, capacity: usize) -> (Arc<Connection>, mpsc::Receiver<ServerMessage>) {
        let (conn, rx) = Connection::channel(capacity);
        conn.bind_principal(AuthenticatedUser::new(user(id), None));
        (conn, rx)
    }

    fn item_added(board: BoardId, from: &str) -> SyncEvent {
        SyncEvent::ItemAdded {
            from: Originator {
                id: user(from),
                name: None,
            },
            item: Item::new("card", board, ColumnId::new(), 0),
        }
    }

    #[tokio::test]
    async fn delivers_to_all_listeners_including_originator() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = EventDispatcher::new(registry.clone());
        let board = BoardId::new();
        let scope = Scope::Board(board);

        let (a, mut rx_a) = authed("u-1", 8);
        let (b, mut rx_b) = authed("u-2", 8);
        registry.register(scope.clone(), &a).await;
        registry.register(scope.clone(), &b).await;

        let report = dispatcher
            .dispatch(DomainEvent::new(scope, item_added(board, "u-1")))
            .await;

        assert_eq!(report.delivered, 2);
        assert!(rx_a.recv().await.unwrap().as_sync().is_some());
        assert!(rx_b.recv().await.unwrap().as_sync().is_some());
    }

    #[tokio::test]
    async fn allow_list_and_unauthenticated_are_filtered() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = EventDispatcher::new(registry.clone());
        let board = BoardId::new();
        let scope = Scope::Board(board);

        let (allowed, mut rx_allowed) = authed("u-1", 8);
        let (denied, mut rx_denied) = authed("u-2", 8);
        let (anonymous, _rx_anon) = Connection::channel(8);
        registry.register(scope.clone(), &allowed).await;
        registry.register(scope.clone(), &denied).await;
        registry.register(scope.clone(), &anonymous).await;

        let event = DomainEvent::new(scope, item_added(board, "u-1"))
            .with_allow(Some([user("u-1")].into_iter().collect()));
        let report = dispatcher.dispatch(event).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.filtered, 2);
        assert!(rx_allowed.recv().await.is_some());
        assert!(rx_denied.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_does_not_block_other_recipients() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = EventDispatcher::new(registry.clone());
        let board = BoardId::new();
        let scope = Scope::Board(board);

        let (slow, _rx_slow) = authed("u-1", 1);
        let (fast, mut rx_fast) = authed("u-2", 8);
        registry.register(scope.clone(), &slow).await;
        registry.register(scope.clone(), &fast).await;

        dispatcher
            .dispatch(DomainEvent::new(scope.clone(), item_added(board, "u-3")))
            .await;
        let report = dispatcher
            .dispatch(DomainEvent::new(scope, item_added(board, "u-3")))
            .await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert!(rx_fast.recv().await.is_some());
        assert!(rx_fast.recv().await.is_some());
    }

    #[tokio::test]
    async fn user_scope_targets_the_user_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = EventDispatcher::new(registry.clone());
        let (conn, mut rx) = authed("u-1", 8);
        registry.register_user(&user("u-1"), &conn).await;

        let report = dispatcher
            .dispatch(DomainEvent::new(
                Scope::User(user("u-1")),
                item_added(BoardId::new(), "u-1"),
            ))
            .await;

        assert_eq!(report.delivered, 1);
        assert!(rx.recv().await.is_some());

        let report = dispatcher
            .dispatch(DomainEvent::new(
                Scope::User(user("u-9")),
                item_added(BoardId::new(), "u-1"),
            ))
            .await;
        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test]
    async fn team_listeners_get_board_events_once() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = EventDispatcher::new(registry.clone());
        let board = BoardId::new();
        let team = TeamId::new();

        let (both, mut rx_both) = authed("u-1", 8);
        let (team_only, mut rx_team) = authed("u-2", 8);
        let (hidden, mut rx_hidden) = authed("u-3", 8);
        registry.register(Scope::Board(board), &both).await;
        registry.register(Scope::Team(team), &both).await;
        registry.register(Scope::Team(team), &team_only).await;
        registry.register(Scope::Team(team), &hidden).await;

        let event = DomainEvent::new(Scope::Board(board), item_added(board, "u-1"))
            .also_to(Scope::Team(team))
            .with_allow(Some([user("u-1"), user("u-2")].into_iter().collect()));
        let report = dispatcher.dispatch(event).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.filtered, 1);
        assert!(rx_both.recv().await.is_some());
        assert!(rx_both.try_recv().is_err());
        assert!(rx_team.recv().await.is_some());
        assert!(rx_hidden.try_recv().is_err());
    }
}
