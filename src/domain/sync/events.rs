//! State-change events fanned out to listening connections.
//!
//! Each variant maps to one wire event name. Every variant carries `from`,
//! the public identity of the principal whose action produced it, so a
//! receiver can recognise and skip its own changes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::board::{Column, Item};
use crate::domain::foundation::{BoardId, ColumnId, Originator, UserId};

use super::Scope;

/// Server-originated mutation payloads, tagged by wire event name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SyncEvent {
    #[serde(rename = "item added")]
    ItemAdded { from: Originator, item: Item },

    #[serde(rename = "item edited")]
    ItemEdited { from: Originator, item: Item },

    #[serde(rename = "item position updated", rename_all = "camelCase")]
    ItemPositionUpdated {
        from: Originator,
        item: Item,
        old_column_id: ColumnId,
    },

    #[serde(rename = "item removed", rename_all = "camelCase")]
    ItemRemoved {
        from: Originator,
        item: Item,
        old_board_id: BoardId,
        old_column_id: ColumnId,
    },

    #[serde(rename = "column added", rename_all = "camelCase")]
    ColumnAdded {
        from: Originator,
        board_id: BoardId,
        column: Column,
    },

    #[serde(rename = "column removed", rename_all = "camelCase")]
    ColumnRemoved {
        from: Originator,
        board_id: BoardId,
        column: Column,
    },
}

impl SyncEvent {
    /// Principal whose action produced this event.
    pub fn from(&self) -> &Originator {
        match self {
            SyncEvent::ItemAdded { from, .. }
            | SyncEvent::ItemEdited { from, .. }
            | SyncEvent::ItemPositionUpdated { from, .. }
            | SyncEvent::ItemRemoved { from, .. }
            | SyncEvent::ColumnAdded { from, .. }
            | SyncEvent::ColumnRemoved { from, .. } => from,
        }
    }

    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::ItemAdded { .. } => "item added",
            SyncEvent::ItemEdited { .. } => "item edited",
            SyncEvent::ItemPositionUpdated { .. } => "item position updated",
            SyncEvent::ItemRemoved { .. } => "item removed",
            SyncEvent::ColumnAdded { .. } => "column added",
            SyncEvent::ColumnRemoved { .. } => "column removed",
        }
    }
}

/// A sync event plus where it should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEvent {
    pub scope: Scope,
    /// Broader scopes that also receive the event. A connection listening
    /// on several of them gets it once.
    pub also: Vec<Scope>,
    /// When set, only these principals among the listeners receive it.
    pub allow: Option<HashSet<UserId>>,
    pub payload: SyncEvent,
}

impl DomainEvent {
    pub fn new(scope: Scope, payload: SyncEvent) -> Self {
        Self {
            scope,
            also: Vec::new(),
            allow: None,
            payload,
        }
    }

    /// Adds a further scope whose listeners receive the event.
    pub fn also_to(mut self, scope: Scope) -> Self {
        if scope != self.scope && !self.also.contains(&scope) {
            self.also.push(scope);
        }
        self
    }

    /// Primary scope first, then the broader ones.
    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        std::iter::once(&self.scope).chain(self.also.iter())
    }

    /// Restricts delivery to the given principals.
    pub fn with_allow(mut self, allow: Option<HashSet<UserId>>) -> Self {
        self.allow = allow;
        self
    }

    pub fn originator(&self) -> &Originator {
        self.payload.from()
    }

    /// Whether a listener authenticated as `user` may receive this event.
    pub fn admits(&self, user: &UserId) -> bool {
        self.allow.as_ref().map_or(true, |allow| allow.contains(user))
    }
}
