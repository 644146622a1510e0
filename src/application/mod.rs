//! Application layer - Command handlers and client-side replicas.
//!
//! - `access` - Visibility checks shared by listens and commands
//! - `handlers` - Item and column commands with fan-out
//! - `replica` - A device's local copy of one board, kept current from events

pub mod access;
pub mod handlers;
pub mod replica;

pub use handlers::{BoardLocks, ItemService};
pub use replica::BoardReplica;
