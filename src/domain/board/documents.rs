//! Board, column, and team documents as the sync core sees them.
//!
//! Only the fields needed for ordering and routing are modelled.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{BoardId, ColumnId, TeamId, UserId};

/// An ordered bucket of items within a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ColumnId::new(),
            name: name.into(),
        }
    }
}

/// A plate: a collection of ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: BoardId,
    pub owner: UserId,
    pub name: String,
    /// Team the board is shared with, if any.
    #[serde(default)]
    pub team_id: Option<TeamId>,
    /// Columns in display order. The first one is the default column.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Restricts a shared board to a subset of the team.
    #[serde(default)]
    pub visible_to: Option<HashSet<UserId>>,
}

impl Board {
    /// Creates a personal board with the given columns.
    pub fn new(owner: UserId, name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            id: BoardId::new(),
            owner,
            name: name.into(),
            team_id: None,
            columns,
            visible_to: None,
        }
    }

    /// Shares the board with a team.
    pub fn shared_with(mut self, team_id: TeamId) -> Self {
        self.team_id = Some(team_id);
        self
    }

    /// Restricts visibility to the named principals (plus the owner).
    pub fn visible_only_to(mut self, users: impl IntoIterator<Item = UserId>) -> Self {
        self.visible_to = Some(users.into_iter().collect());
        self
    }

    pub fn is_shared(&self) -> bool {
        self.team_id.is_some()
    }

    /// Column ids in display order.
    pub fn column_ids(&self) -> Vec<ColumnId> {
        self.columns.iter().map(|c| c.id).collect()
    }

    pub fn has_column(&self, column_id: &ColumnId) -> bool {
        self.columns.iter().any(|c| &c.id == column_id)
    }

    /// The designated fallback column: the first one.
    pub fn default_column(&self) -> Option<ColumnId> {
        self.columns.first().map(|c| c.id)
    }

    /// Whether `user` may see this board.
    ///
    /// The owner always can. Anyone else needs membership in the board's
    /// team and, when a visibility list is set, a place on it.
    pub fn can_view(&self, user: &UserId, team: Option<&Team>) -> bool {
        if &self.owner == user {
            return true;
        }
        let Some(team) = team else {
            return false;
        };
        if Some(team.id) != self.team_id || !team.is_member(user) {
            return false;
        }
        match &self.visible_to {
            Some(allowed) => allowed.contains(user),
            None => true,
        }
    }

    /// Principals that may receive events for this board, when restricted.
    pub fn audience(&self) -> Option<HashSet<UserId>> {
        self.visible_to.as_ref().map(|allowed| {
            let mut audience = allowed.clone();
            audience.insert(self.owner.clone());
            audience
        })
    }
}

/// A group of principals sharing boards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub members: HashSet<UserId>,
}

impl Team {
    pub fn new(name: impl Into<String>, members: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            id: TeamId::new(),
            name: name.into(),
            members: members.into_iter().collect(),
        }
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }
}
