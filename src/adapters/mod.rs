//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the sync core to external systems:
//! - `auth` - Handshake credential verification (JWT, mock)
//! - `providers` - Chat/mail streaming clients (mock)
//! - `store` - Document store (in-memory)
//! - `websocket` - Connections, registry, fan-out, and the axum socket

pub mod auth;
pub mod providers;
pub mod store;
pub mod websocket;
