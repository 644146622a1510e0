//! SyncPublisher port - hands domain events to the fan-out layer.

use async_trait::async_trait;

use crate::domain::sync::DomainEvent;

/// Outcome of fanning one event out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Connections the event was queued for.
    pub delivered: usize,
    /// Connections excluded by the allow list or still unauthenticated.
    pub filtered: usize,
    /// Connections whose queue was full or closed.
    pub failed: usize,
}

/// Publishes state-change events to interested connections.
///
/// Delivery is fire-and-forget per recipient; implementations never fail
/// the whole publish because one recipient is slow or gone.
#[async_trait]
pub trait SyncPublisher: Send + Sync {
    async fn dispatch(&self, event: DomainEvent) -> DispatchReport;
}
