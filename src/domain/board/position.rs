//! Position engine: gap-free ordering of items within columns.
//!
//! Each `(board, column)` pair owns a sequence of item ids; an item's
//! position is its index in that sequence, so positions within a column are
//! always exactly `0..n`. Every mutation reports the minimal set of
//! placements that changed, which is what callers persist or apply.
//!
//! # Moves
//!
//! A move is a remove from the source column followed by an insert into
//! the target column. Source and target may sit on different boards, and
//! their sequences are independent of each other.
//!
//! ```text
//! C1: [A, B, I]      move(I, C2, 0)      C1: [A, B]
//! C2: [X, Y]        ───────────────▶     C2: [I, X, Y]
//! ```
//!
//! # Fallback placement
//!
//! When a target column is no longer part of its board (for example an
//! item's previous column was deleted), the item lands at the head of the
//! board's first column and the update is flagged with `fell_back`.

use std::collections::HashMap;

use thiserror::Error;

use crate::domain::foundation::{BoardId, ColumnId, DomainError, ErrorCode, ItemId};

use super::{Board, Item, Placement};

/// One ordered sequence: a column on a particular board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnScope {
    pub board_id: BoardId,
    pub column_id: ColumnId,
}

impl ColumnScope {
    pub fn new(board_id: BoardId, column_id: ColumnId) -> Self {
        Self {
            board_id,
            column_id,
        }
    }
}

impl Placement {
    /// The sequence this placement indexes into.
    pub fn scope(&self) -> ColumnScope {
        ColumnScope::new(self.board_id, self.column_id)
    }
}

/// New placement of an item that was shifted or moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionChange {
    pub item_id: ItemId,
    pub placement: Placement,
}

/// Result of a single engine operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionUpdate {
    /// Item the operation targeted.
    pub item_id: ItemId,
    /// Placement before the operation (`None` for inserts).
    pub from: Option<Placement>,
    /// Placement after the operation (`None` for removals).
    pub to: Option<Placement>,
    /// Other items whose placement changed as a consequence.
    pub shifted: Vec<PositionChange>,
    /// The requested column was stale and the default column was used.
    pub fell_back: bool,
}

impl PositionUpdate {
    /// True when nothing changed at all.
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.shifted.is_empty()
    }

    /// Every placement that must be written back, the target item first.
    pub fn changes(&self) -> Vec<PositionChange> {
        let mut changes = Vec::with_capacity(self.shifted.len() + 1);
        if let Some(to) = self.to {
            if self.from != Some(to) {
                changes.push(PositionChange {
                    item_id: self.item_id,
                    placement: to,
                });
            }
        }
        changes.extend(self.shifted.iter().copied());
        changes
    }
}

/// Errors from position operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PositionError {
    #[error("Item {0} is not placed on any loaded board")]
    UnknownItem(ItemId),

    #[error("Item {0} is already placed")]
    AlreadyPlaced(ItemId),

    #[error("Board {0} is not loaded")]
    UnknownBoard(BoardId),

    #[error("Board {0} has no columns")]
    NoColumns(BoardId),

    #[error("Column {0} still holds items")]
    ColumnNotEmpty(ColumnId),
}

impl From<PositionError> for DomainError {
    fn from(err: PositionError) -> Self {
        let code = match &err {
            PositionError::UnknownItem(_) => ErrorCode::ItemNotFound,
            PositionError::UnknownBoard(_) => ErrorCode::BoardNotFound,
            PositionError::NoColumns(_) => ErrorCode::NoColumns,
            PositionError::ColumnNotEmpty(_) => ErrorCode::ColumnNotEmpty,
            PositionError::AlreadyPlaced(_) => ErrorCode::InternalError,
        };
        DomainError::new(code, err.to_string())
    }
}

/// Ordered-list model for items across boards and columns.
#[derive(Debug, Default, Clone)]
pub struct PositionEngine {
    /// Column order per board; the first column is the default.
    columns: HashMap<BoardId, Vec<ColumnId>>,
    sequences: HashMap<ColumnScope, Vec<ItemId>>,
    locations: HashMap<ItemId, ColumnScope>,
    previous: HashMap<ItemId, ColumnId>,
}

impl PositionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // === Boards and columns ===

    /// Registers a board and its column order, replacing any prior order.
    pub fn add_board(&mut self, board_id: BoardId, columns: impl IntoIterator<Item = ColumnId>) {
        self.columns.insert(board_id, columns.into_iter().collect());
    }

    /// Appends a column to a loaded board.
    pub fn add_column(&mut self, board_id: BoardId, column_id: ColumnId) -> Result<(), PositionError> {
        let columns = self
            .columns
            .get_mut(&board_id)
            .ok_or(PositionError::UnknownBoard(board_id))?;
        if !columns.contains(&column_id) {
            columns.push(column_id);
        }
        Ok(())
    }

    /// Removes an empty column from a board.
    pub fn remove_column(&mut self, board_id: BoardId, column_id: ColumnId) -> Result<(), PositionError> {
        if self.len(board_id, column_id) > 0 {
            return Err(PositionError::ColumnNotEmpty(column_id));
        }
        let columns = self
            .columns
            .get_mut(&board_id)
            .ok_or(PositionError::UnknownBoard(board_id))?;
        columns.retain(|c| *c != column_id);
        Ok(())
    }

    /// Column order of a board (empty if the board is not loaded).
    pub fn columns(&self, board_id: BoardId) -> &[ColumnId] {
        self.columns.get(&board_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Loads a board and its stored items, normalising their positions.
    ///
    /// Stored positions only determine relative order; gaps and duplicates
    /// are squeezed out. Items pointing at a column the board no longer has
    /// are appended to the default column. Returns the placements that
    /// differ from what was stored.
    pub fn hydrate(&mut self, board: &Board, items: &[Item]) -> Vec<PositionChange> {
        self.locations.retain(|_, scope| scope.board_id != board.id);
        self.sequences.retain(|scope, _| scope.board_id != board.id);
        self.add_board(board.id, board.column_ids());

        let mut ordered: Vec<&Item> = items.iter().filter(|i| i.board_id == board.id).collect();
        ordered.sort_by(|a, b| a.pos.cmp(&b.pos).then_with(|| a.id.cmp(&b.id)));

        let mut repaired = Vec::new();
        for item in ordered {
            let column_id = if board.has_column(&item.column_id) {
                item.column_id
            } else if let Some(default) = board.default_column() {
                tracing::warn!(
                    item_id = %item.id,
                    board_id = %board.id,
                    column_id = %item.column_id,
                    "Stored item points at a missing column, moving it to the default column"
                );
                default
            } else {
                tracing::warn!(
                    item_id = %item.id,
                    board_id = %board.id,
                    "Board has no columns, item left unplaced"
                );
                continue;
            };

            let scope = ColumnScope::new(board.id, column_id);
            let sequence = self.sequences.entry(scope).or_default();
            sequence.push(item.id);
            let pos = sequence.len() - 1;
            self.locations.insert(item.id, scope);
            if let Some(previous) = item.previous_column {
                self.previous.insert(item.id, previous);
            }

            if pos != item.pos || column_id != item.column_id {
                repaired.push(PositionChange {
                    item_id: item.id,
                    placement: Placement {
                        board_id: board.id,
                        column_id,
                        pos,
                    },
                });
            }
        }
        repaired
    }

    // === Queries ===

    pub fn placement(&self, item_id: ItemId) -> Option<Placement> {
        let scope = self.locations.get(&item_id)?;
        let pos = self.sequences.get(scope)?.iter().position(|id| *id == item_id)?;
        Some(Placement {
            board_id: scope.board_id,
            column_id: scope.column_id,
            pos,
        })
    }

    pub fn previous_column(&self, item_id: ItemId) -> Option<ColumnId> {
        self.previous.get(&item_id).copied()
    }

    /// Items of a column in position order.
    pub fn column_items(&self, board_id: BoardId, column_id: ColumnId) -> &[ItemId] {
        self.sequences
            .get(&ColumnScope::new(board_id, column_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `(item, pos)` pairs of a column in position order.
    pub fn positions(&self, board_id: BoardId, column_id: ColumnId) -> Vec<(ItemId, usize)> {
        self.column_items(board_id, column_id)
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect()
    }

    pub fn len(&self, board_id: BoardId, column_id: ColumnId) -> usize {
        self.column_items(board_id, column_id).len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Checks that every placed item appears exactly once, in the sequence
    /// its location points to.
    pub fn is_contiguous(&self) -> bool {
        let placed: usize = self.sequences.values().map(Vec::len).sum();
        placed == self.locations.len()
            && self
                .sequences
                .iter()
                .all(|(scope, seq)| seq.iter().all(|id| self.locations.get(id) == Some(scope)))
    }

    // === Mutations ===

    /// Inserts a new item at `pos` (clamped to `[0, n]`), shifting later
    /// items up by one.
    pub fn insert(
        &mut self,
        item_id: ItemId,
        board_id: BoardId,
        column_id: ColumnId,
        pos: usize,
    ) -> Result<PositionUpdate, PositionError> {
        if self.locations.contains_key(&item_id) {
            return Err(PositionError::AlreadyPlaced(item_id));
        }
        let (column_id, fell_back) = self.resolve_column(board_id, column_id)?;
        let pos = if fell_back { 0 } else { pos };

        let scope = ColumnScope::new(board_id, column_id);
        let to = self.place(item_id, scope, pos);
        let shifted = self.trailing(scope, to.pos + 1);

        Ok(PositionUpdate {
            item_id,
            from: None,
            to: Some(to),
            shifted,
            fell_back,
        })
    }

    /// Removes an item, shifting later items in its column down by one.
    pub fn remove(&mut self, item_id: ItemId) -> Result<PositionUpdate, PositionError> {
        let from = self.take(item_id)?;
        self.previous.remove(&item_id);
        let shifted = self.trailing(from.scope(), from.pos);

        Ok(PositionUpdate {
            item_id,
            from: Some(from),
            to: None,
            shifted,
            fell_back: false,
        })
    }

    /// Moves an item to `to_pos` of the target column, possibly on another
    /// board. Moving an item onto its current position changes nothing.
    pub fn move_item(
        &mut self,
        item_id: ItemId,
        to_board: BoardId,
        to_column: ColumnId,
        to_pos: usize,
    ) -> Result<PositionUpdate, PositionError> {
        let from = self
            .placement(item_id)
            .ok_or(PositionError::UnknownItem(item_id))?;
        let (to_column, fell_back) = self.resolve_column(to_board, to_column)?;
        let to_pos = if fell_back { 0 } else { to_pos };

        let source = from.scope();
        let target = ColumnScope::new(to_board, to_column);

        if source == target {
            let last = self.len(to_board, to_column).saturating_sub(1);
            if to_pos.min(last) == from.pos {
                return Ok(PositionUpdate {
                    item_id,
                    from: Some(from),
                    to: Some(from),
                    shifted: Vec::new(),
                    fell_back,
                });
            }
        }

        let source_before = self.snapshot(source);
        let target_before = self.snapshot(target);

        self.take(item_id)?;
        let to = self.place(item_id, target, to_pos);
        if source.column_id != target.column_id {
            self.previous.insert(item_id, source.column_id);
        }

        let mut shifted = self.diff(source, &source_before, item_id);
        if source != target {
            shifted.extend(self.diff(target, &target_before, item_id));
        }

        Ok(PositionUpdate {
            item_id,
            from: Some(from),
            to: Some(to),
            shifted,
            fell_back,
        })
    }

    /// Applies a move announced by another device.
    ///
    /// Same algorithm as [`move_item`](Self::move_item). The announced
    /// source column is advisory: if it disagrees with the local copy the
    /// local placement wins, and an item this copy has never seen is
    /// inserted. Callers must drop their own echoes before calling this.
    pub fn apply_remote_move(
        &mut self,
        item_id: ItemId,
        board_id: BoardId,
        to_column: ColumnId,
        to_pos: usize,
        from_column: Option<ColumnId>,
    ) -> Result<PositionUpdate, PositionError> {
        match self.placement(item_id) {
            Some(current) => {
                if from_column.is_some_and(|c| c != current.column_id) {
                    tracing::debug!(
                        item_id = %item_id,
                        announced = ?from_column,
                        actual = %current.column_id,
                        "Remote move source is stale, using local placement"
                    );
                }
                self.move_item(item_id, board_id, to_column, to_pos)
            }
            None => self.insert(item_id, board_id, to_column, to_pos),
        }
    }

    /// Moves an item back to the head of the column it last left.
    ///
    /// Falls back to the head of the board's first column when there is
    /// no previous column or it no longer exists.
    pub fn reopen(&mut self, item_id: ItemId) -> Result<PositionUpdate, PositionError> {
        let current = self
            .placement(item_id)
            .ok_or(PositionError::UnknownItem(item_id))?;
        let board_id = current.board_id;

        let previous = self
            .previous_column(item_id)
            .filter(|column| self.columns(board_id).contains(column));

        let (column_id, fell_back) = match previous {
            Some(column) => (column, false),
            None => {
                let default = self
                    .columns(board_id)
                    .first()
                    .copied()
                    .ok_or(PositionError::NoColumns(board_id))?;
                tracing::warn!(
                    item_id = %item_id,
                    board_id = %board_id,
                    "Previous column unavailable, reopening into the default column"
                );
                (default, true)
            }
        };

        let mut update = self.move_item(item_id, board_id, column_id, 0)?;
        update.fell_back |= fell_back;
        Ok(update)
    }

    // === Internals ===

    fn resolve_column(
        &self,
        board_id: BoardId,
        column_id: ColumnId,
    ) -> Result<(ColumnId, bool), PositionError> {
        let columns = self
            .columns
            .get(&board_id)
            .ok_or(PositionError::UnknownBoard(board_id))?;
        if columns.contains(&column_id) {
            return Ok((column_id, false));
        }
        let fallback = columns
            .first()
            .copied()
            .ok_or(PositionError::NoColumns(board_id))?;
        tracing::warn!(
            board_id = %board_id,
            column_id = %column_id,
            fallback = %fallback,
            "Column is not on the board, placing at head of the default column"
        );
        Ok((fallback, true))
    }

    fn place(&mut self, item_id: ItemId, scope: ColumnScope, pos: usize) -> Placement {
        let sequence = self.sequences.entry(scope).or_default();
        let pos = pos.min(sequence.len());
        sequence.insert(pos, item_id);
        self.locations.insert(item_id, scope);
        Placement {
            board_id: scope.board_id,
            column_id: scope.column_id,
            pos,
        }
    }

    fn take(&mut self, item_id: ItemId) -> Result<Placement, PositionError> {
        let scope = self
            .locations
            .remove(&item_id)
            .ok_or(PositionError::UnknownItem(item_id))?;
        let sequence = self
            .sequences
            .get_mut(&scope)
            .ok_or(PositionError::UnknownItem(item_id))?;
        let pos = sequence
            .iter()
            .position(|id| *id == item_id)
            .ok_or(PositionError::UnknownItem(item_id))?;
        sequence.remove(pos);
        if sequence.is_empty() {
            self.sequences.remove(&scope);
        }
        Ok(Placement {
            board_id: scope.board_id,
            column_id: scope.column_id,
            pos,
        })
    }

    fn snapshot(&self, scope: ColumnScope) -> Vec<ItemId> {
        self.sequences.get(&scope).cloned().unwrap_or_default()
    }

    /// Placements in `scope` from index `from` onwards.
    fn trailing(&self, scope: ColumnScope, from: usize) -> Vec<PositionChange> {
        self.column_items(scope.board_id, scope.column_id)
            .iter()
            .enumerate()
            .skip(from)
            .map(|(pos, id)| PositionChange {
                item_id: *id,
                placement: Placement {
                    board_id: scope.board_id,
                    column_id: scope.column_id,
                    pos,
                },
            })
            .collect()
    }

    /// Items of `scope` (other than `moved`) whose index differs from `before`.
    fn diff(&self, scope: ColumnScope, before: &[ItemId], moved: ItemId) -> Vec<PositionChange> {
        self.column_items(scope.board_id, scope.column_id)
            .iter()
            .enumerate()
            .filter(|(pos, id)| **id != moved && before.get(*pos) != Some(*id))
            .map(|(pos, id)| PositionChange {
                item_id: *id,
                placement: Placement {
                    board_id: scope.board_id,
                    column_id: scope.column_id,
                    pos,
                },
            })
            .collect()
    }
}
