//! Connection registry: which connections listen on which scope.
//!
//! # Architecture
//!
//! ```text
//! board:b1            team:t1          user index
//! ├── conn-a          └── conn-c       u-1 → conn-b
//! └── conn-b                           u-2 → conn-c
//! ```
//!
//! Every connection also tracks the scopes it is registered under. Both
//! sides are updated under the registry's write lock (registry first, then
//! the connection's own set), so a scope bucket lists a connection exactly
//! when that connection lists the scope.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::foundation::{ConnectionId, UserId};
use crate::domain::sync::Scope;

use super::connection::Connection;

#[derive(Default)]
struct RegistryState {
    buckets: HashMap<Scope, HashMap<ConnectionId, Arc<Connection>>>,
    users: HashMap<UserId, Arc<Connection>>,
}

/// Index of listening connections per scope plus one connection per user.
///
/// # Thread Safety
///
/// Uses `RwLock` since fan-out lookups vastly outnumber listen/unlisten
/// calls. Readers receive cloned snapshots and never hold the lock while
/// delivering.
#[derive(Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `connection` to the scope's bucket.
    ///
    /// Returns true if it was newly added. A closed connection is refused
    /// so a listen request racing with teardown cannot leave it behind.
    pub async fn register(&self, scope: Scope, connection: &Arc<Connection>) -> bool {
        let mut state = self.state.write().await;
        if connection.is_closed() {
            return false;
        }

        let added = state
            .buckets
            .entry(scope.clone())
            .or_default()
            .insert(connection.id(), Arc::clone(connection))
            .is_none();
        connection.listening.lock().await.insert(scope.clone());

        if added {
            tracing::debug!(scope = %scope, connection_id = %connection.id(), "Connection registered");
        }
        added
    }

    /// Removes `connection` from the scope's bucket, dropping the bucket if
    /// it empties. Returns true if it was present.
    pub async fn unregister(&self, scope: &Scope, connection: &Connection) -> bool {
        let mut state = self.state.write().await;
        let removed = Self::detach(&mut state, scope, connection.id());
        connection.listening.lock().await.remove(scope);

        if removed {
            tracing::debug!(scope = %scope, connection_id = %connection.id(), "Connection unregistered");
        }
        removed
    }

    /// Snapshot of the connections listening on `scope`.
    pub async fn listeners(&self, scope: &Scope) -> Vec<Arc<Connection>> {
        self.state
            .read()
            .await
            .buckets
            .get(scope)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn listener_count(&self, scope: &Scope) -> usize {
        self.state
            .read()
            .await
            .buckets
            .get(scope)
            .map_or(0, HashMap::len)
    }

    /// Whether `connection_id` is in the scope's bucket.
    pub async fn contains(&self, scope: &Scope, connection_id: ConnectionId) -> bool {
        self.state
            .read()
            .await
            .buckets
            .get(scope)
            .is_some_and(|bucket| bucket.contains_key(&connection_id))
    }

    /// Makes `connection` the user's direct connection, replacing any
    /// previous holder.
    pub async fn register_user(&self, user: &UserId, connection: &Arc<Connection>) -> bool {
        let mut state = self.state.write().await;
        if connection.is_closed() {
            return false;
        }
        state.users.insert(user.clone(), Arc::clone(connection));
        true
    }

    /// The user's current direct connection.
    pub async fn user_connection(&self, user: &UserId) -> Option<Arc<Connection>> {
        self.state.read().await.users.get(user).cloned()
    }

    /// Deletes a scope's bucket entirely, returning the connections that
    /// were in it. Used when the underlying entity goes away.
    pub async fn purge_scope(&self, scope: &Scope) -> Vec<Arc<Connection>> {
        let mut state = self.state.write().await;
        let Some(bucket) = state.buckets.remove(scope) else {
            return Vec::new();
        };

        let connections: Vec<_> = bucket.into_values().collect();
        for connection in &connections {
            connection.listening.lock().await.remove(scope);
        }

        tracing::info!(scope = %scope, connections = connections.len(), "Scope purged");
        connections
    }

    /// Removes `connection` from every bucket it is in and from the user
    /// index if it is the current holder. Returns the number of scopes it
    /// was removed from.
    pub async fn remove_connection(&self, connection: &Connection) -> usize {
        let mut state = self.state.write().await;
        let scopes: Vec<Scope> = connection.listening.lock().await.drain().collect();

        for scope in &scopes {
            Self::detach(&mut state, scope, connection.id());
        }

        if let Some(user) = connection.user_id() {
            let holds_user = state
                .users
                .get(user)
                .is_some_and(|holder| holder.id() == connection.id());
            if holds_user {
                state.users.remove(user);
            }
        }

        scopes.len()
    }

    /// Scopes with at least one listener.
    pub async fn active_scopes(&self) -> Vec<Scope> {
        self.state.read().await.buckets.keys().cloned().collect()
    }

    /// Number of distinct connections registered anywhere.
    pub async fn connection_count(&self) -> usize {
        let state = self.state.read().await;
        let mut ids: std::collections::HashSet<ConnectionId> = state
            .buckets
            .values()
            .flat_map(|bucket| bucket.keys().copied())
            .collect();
        ids.extend(state.users.values().map(|conn| conn.id()));
        ids.len()
    }

    fn detach(state: &mut RegistryState, scope: &Scope, connection_id: ConnectionId) -> bool {
        let Some(bucket) = state.buckets.get_mut(scope) else {
            return false;
        };
        let removed = bucket.remove(&connection_id).is_some();
        if bucket.is_empty() {
            state.buckets.remove(scope);
        }
        removed
    }
}
