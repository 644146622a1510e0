//! Ordered items (cards) and their placement.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{BoardId, ColumnId, ItemId};

/// Where an item sits: board, column, and zero-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub board_id: BoardId,
    pub column_id: ColumnId,
    pub pos: usize,
}

/// A unit of work with a position within a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub board_id: BoardId,
    pub column_id: ColumnId,
    pub pos: usize,
    pub title: String,
    /// Column the item last left, used when reopening it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_column: Option<ColumnId>,
}

impl Item {
    pub fn new(title: impl Into<String>, board_id: BoardId, column_id: ColumnId, pos: usize) -> Self {
        Self {
            id: ItemId::new(),
            board_id,
            column_id,
            pos,
            title: title.into(),
            previous_column: None,
        }
    }

    pub fn placement(&self) -> Placement {
        Placement {
            board_id: self.board_id,
            column_id: self.column_id,
            pos: self.pos,
        }
    }

    /// Overwrites the item's placement, remembering the column it left.
    pub fn place(&mut self, placement: Placement) {
        if placement.column_id != self.column_id || placement.board_id != self.board_id {
            self.previous_column = Some(self.column_id);
        }
        self.board_id = placement.board_id;
        self.column_id = placement.column_id;
        self.pos = placement.pos;
    }
}
