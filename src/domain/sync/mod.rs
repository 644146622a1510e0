//! Sync vocabulary: routing scopes and the events fanned out to clients.

mod events;
mod scope;

pub use events::{DomainEvent, SyncEvent};
pub use scope::{EntityKind, Provider, Scope};
