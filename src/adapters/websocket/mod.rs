//! WebSocket adapters for real-time board synchronization.
//!
//! This module holds the per-connection state and the fan-out machinery
//! that pushes state changes to connected clients.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    ItemService (application)                        │
//! │   - Mutates boards and items, publishes DomainEvents                │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     │ SyncPublisher::dispatch
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      EventDispatcher                                │
//! │   - Resolves listeners for the event's scope                        │
//! │   - Applies the allow list, try_delivers to each                    │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     │ reads
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    ConnectionRegistry                               │
//! │   board:b1          team:t1          chat:a1         user index     │
//! │   ├── conn-a        └── conn-c       └── conn-a      u-1 → conn-a   │
//! │   └── conn-b                                                        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`messages`] - Wire protocol types
//! - [`connection`] - Per-connection state and outbound queue
//! - [`registry`] - Scope → connections index
//! - [`dispatcher`] - Fan-out of domain events
//! - [`adapter_manager`] - Chat/mail provider adapters per connection
//! - [`session`] - Handshake, command handling, teardown
//! - [`handler`] - Axum WebSocket upgrade handler

pub mod adapter_manager;
pub mod connection;
pub mod dispatcher;
pub mod handler;
pub mod messages;
pub mod registry;
pub mod session;

pub use adapter_manager::{AdapterError, AdapterHandle, ExternalAdapterManager};
pub use connection::{Connection, DeliveryError};
pub use dispatcher::EventDispatcher;
pub use handler::{sync_router, ws_handler};
pub use messages::{ClientMessage, ConnectionNotice, ServerMessage};
pub use registry::ConnectionRegistry;
pub use session::{
    teardown, ConnectionDriver, ConnectionSettings, DriverExit, HandshakeError, SyncState,
};
