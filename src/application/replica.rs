//! BoardReplica - one device's copy of a board, kept current from sync events.
//!
//! Local moves are applied optimistically. Incoming events run through the
//! same position algorithm, after dropping the device's own echoes: the
//! dispatcher delivers an event to its originator too, and replaying it here
//! would apply the move twice.

use std::collections::HashMap;

use crate::domain::board::{Board, Item, PositionChange, PositionEngine, PositionError, PositionUpdate};
use crate::domain::foundation::{ColumnId, ItemId, UserId};
use crate::domain::sync::SyncEvent;

pub struct BoardReplica {
    me: UserId,
    board: Board,
    items: HashMap<ItemId, Item>,
    engine: PositionEngine,
}

impl BoardReplica {
    /// Builds the replica from a snapshot, normalising stored positions.
    pub fn new(me: UserId, board: Board, items: Vec<Item>) -> Self {
        let mut engine = PositionEngine::new();
        let repairs = engine.hydrate(&board, &items);
        let mut replica = Self {
            me,
            items: items
                .into_iter()
                .filter(|i| i.board_id == board.id)
                .map(|i| (i.id, i))
                .collect(),
            board,
            engine,
        };
        replica.apply_changes(&repairs);
        replica
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn item(&self, item_id: ItemId) -> Option<&Item> {
        self.items.get(&item_id)
    }

    /// Items of a column in position order.
    pub fn column(&self, column_id: ColumnId) -> Vec<&Item> {
        self.engine
            .column_items(self.board.id, column_id)
            .iter()
            .filter_map(|id| self.items.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_contiguous(&self) -> bool {
        self.engine.is_contiguous()
    }

    /// Applies a move made on this device before the server confirms it.
    pub fn apply_local_move(
        &mut self,
        item_id: ItemId,
        to_column: ColumnId,
        to_pos: usize,
    ) -> Result<PositionUpdate, PositionError> {
        let update = self
            .engine
            .move_item(item_id, self.board.id, to_column, to_pos)?;
        self.apply_changes(&update.changes());
        Ok(update)
    }

    /// Applies an incoming event. Returns whether local state changed.
    ///
    /// Events this device originated, and events about other boards, are
    /// ignored.
    pub fn apply(&mut self, event: &SyncEvent) -> Result<bool, PositionError> {
        if event.from().id == self.me {
            tracing::debug!(event = event.name(), "Dropping own echo");
            return Ok(false);
        }

        match event {
            SyncEvent::ItemAdded { item, .. } => {
                if item.board_id != self.board.id {
                    return Ok(false);
                }
                let update = match self.engine.placement(item.id) {
                    Some(_) => self
                        .engine
                        .move_item(item.id, self.board.id, item.column_id, item.pos)?,
                    None => self
                        .engine
                        .insert(item.id, self.board.id, item.column_id, item.pos)?,
                };
                self.adopt(item, &update);
                Ok(true)
            }

            SyncEvent::ItemEdited { item, .. } => match self.items.get_mut(&item.id) {
                Some(local) if local.title != item.title => {
                    local.title = item.title.clone();
                    Ok(true)
                }
                _ => Ok(false),
            },

            SyncEvent::ItemPositionUpdated {
                item,
                old_column_id,
                ..
            } => {
                if item.board_id != self.board.id {
                    return Ok(false);
                }
                let update = self.engine.apply_remote_move(
                    item.id,
                    self.board.id,
                    item.column_id,
                    item.pos,
                    Some(*old_column_id),
                )?;
                if update.is_noop() && self.items.contains_key(&item.id) {
                    return Ok(false);
                }
                self.adopt(item, &update);
                Ok(true)
            }

            SyncEvent::ItemRemoved {
                item, old_board_id, ..
            } => {
                if *old_board_id != self.board.id || self.engine.placement(item.id).is_none() {
                    return Ok(false);
                }
                let update = self.engine.remove(item.id)?;
                self.items.remove(&item.id);
                self.apply_changes(&update.shifted);
                Ok(true)
            }

            SyncEvent::ColumnAdded {
                board_id, column, ..
            } => {
                if *board_id != self.board.id || self.board.has_column(&column.id) {
                    return Ok(false);
                }
                self.engine.add_column(self.board.id, column.id)?;
                self.board.columns.push(column.clone());
                Ok(true)
            }

            SyncEvent::ColumnRemoved {
                board_id, column, ..
            } => {
                if *board_id != self.board.id || !self.board.has_column(&column.id) {
                    return Ok(false);
                }
                self.engine.remove_column(self.board.id, column.id)?;
                self.board.columns.retain(|c| c.id != column.id);
                Ok(true)
            }
        }
    }

    /// Stores the announced item with the placement the engine gave it.
    fn adopt(&mut self, announced: &Item, update: &PositionUpdate) {
        let mut item = self
            .items
            .remove(&announced.id)
            .unwrap_or_else(|| announced.clone());
        item.title = announced.title.clone();
        if let Some(to) = update.to {
            item.place(to);
        }
        self.items.insert(item.id, item);
        self.apply_changes(&update.shifted);
    }

    fn apply_changes(&mut self, changes: &[PositionChange]) {
        for change in changes {
            if let Some(item) = self.items.get_mut(&change.item_id) {
                item.place(change.placement);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::board::Column;
    use crate::domain::foundation::{BoardId, Originator};

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn from(id: &str) -> Originator {
        Originator {
            id: user(id),
            name: None,
        }
    }

    /// Board with columns [todo, done]; todo holds A, B, C.
    fn replica(me: &str) -> (BoardReplica, Vec<ItemId>) {
        let board = Board::new(user("owner"), "Plate", vec![Column::new("Todo"), Column::new("Done")]);
        let todo = board.columns[0].id;
        let items: Vec<Item> = ["A", "B", "C"]
            .iter()
            .enumerate()
            .map(|(pos, title)| Item::new(*title, board.id, todo, pos))
            .collect();
        let ids = items.iter().map(|i| i.id).collect();
        (BoardReplica::new(user(me), board, items), ids)
    }

    fn titles(replica: &BoardReplica, column: ColumnId) -> Vec<String> {
        replica.column(column).iter().map(|i| i.title.clone()).collect()
    }

    fn columns(replica: &BoardReplica) -> (ColumnId, ColumnId) {
        let cols = replica.board().column_ids();
        (cols[0], cols[1])
    }

    #[test]
    fn own_echo_leaves_state_untouched() {
        let (mut replica, ids) = replica("p1");
        let (todo, done) = columns(&replica);

        replica.apply_local_move(ids[0], done, 0).unwrap();
        let before: Vec<Item> = ids.iter().map(|id| replica.item(*id).unwrap().clone()).collect();

        let echo = SyncEvent::ItemPositionUpdated {
            from: from("p1"),
            item: replica.item(ids[0]).unwrap().clone(),
            old_column_id: todo,
        };
        assert!(!replica.apply(&echo).unwrap());
        assert!(!replica.apply(&echo).unwrap());

        let after: Vec<Item> = ids.iter().map(|id| replica.item(*id).unwrap().clone()).collect();
        assert_eq!(before, after);
        assert_eq!(titles(&replica, todo), vec!["B", "C"]);
        assert_eq!(titles(&replica, done), vec!["A"]);
    }

    #[test]
    fn remote_move_is_applied() {
        let (mut replica, ids) = replica("p1");
        let (todo, done) = columns(&replica);
        let mut moved = replica.item(ids[2]).unwrap().clone();
        moved.column_id = done;
        moved.pos = 0;

        let changed = replica
            .apply(&SyncEvent::ItemPositionUpdated {
                from: from("p2"),
                item: moved,
                old_column_id: todo,
            })
            .unwrap();

        assert!(changed);
        assert_eq!(titles(&replica, todo), vec!["A", "B"]);
        assert_eq!(titles(&replica, done), vec!["C"]);
        assert!(replica.is_contiguous());
    }

    #[test]
    fn stale_source_column_uses_local_placement() {
        let (mut replica, ids) = replica("p1");
        let (todo, done) = columns(&replica);
        let mut moved = replica.item(ids[1]).unwrap().clone();
        moved.pos = 0;

        replica
            .apply(&SyncEvent::ItemPositionUpdated {
                from: from("p2"),
                item: moved,
                old_column_id: done,
            })
            .unwrap();

        assert_eq!(titles(&replica, todo), vec!["B", "A", "C"]);
    }

    #[test]
    fn unknown_item_in_position_update_is_inserted() {
        let (mut replica, _) = replica("p1");
        let (todo, _) = columns(&replica);
        let stranger = Item::new("Z", replica.board().id, todo, 1);

        assert!(replica
            .apply(&SyncEvent::ItemPositionUpdated {
                from: from("p2"),
                item: stranger.clone(),
                old_column_id: todo,
            })
            .unwrap());

        assert_eq!(titles(&replica, todo), vec!["A", "Z", "B", "C"]);
        assert_eq!(replica.len(), 4);
    }

    #[test]
    fn remote_add_and_remove() {
        let (mut replica, ids) = replica("p1");
        let (todo, _) = columns(&replica);
        let added = Item::new("E", replica.board().id, todo, 1);

        replica
            .apply(&SyncEvent::ItemAdded {
                from: from("p2"),
                item: added,
            })
            .unwrap();
        assert_eq!(titles(&replica, todo), vec!["A", "E", "B", "C"]);

        let removed = replica.item(ids[1]).unwrap().clone();
        replica
            .apply(&SyncEvent::ItemRemoved {
                from: from("p2"),
                item: removed,
                old_board_id: replica.board().id,
                old_column_id: todo,
            })
            .unwrap();
        assert_eq!(titles(&replica, todo), vec!["A", "E", "C"]);
        let positions: Vec<usize> = replica.column(todo).iter().map(|i| i.pos).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn events_for_other_boards_are_ignored() {
        let (mut replica, _) = replica("p1");
        let elsewhere = Item::new("X", BoardId::new(), ColumnId::new(), 0);

        assert!(!replica
            .apply(&SyncEvent::ItemAdded {
                from: from("p2"),
                item: elsewhere,
            })
            .unwrap());
        assert_eq!(replica.len(), 3);
    }

    #[test]
    fn remote_edit_changes_title_once() {
        let (mut replica, ids) = replica("p1");
        let mut edited = replica.item(ids[0]).unwrap().clone();
        edited.title = "Apples".into();
        let event = SyncEvent::ItemEdited {
            from: from("p2"),
            item: edited,
        };

        assert!(replica.apply(&event).unwrap());
        assert!(!replica.apply(&event).unwrap());
        assert_eq!(replica.item(ids[0]).unwrap().title, "Apples");
    }

    #[test]
    fn column_events_update_board() {
        let (mut replica, _) = replica("p1");
        let (_, done) = columns(&replica);
        let board_id = replica.board().id;
        let later = Column::new("Later");

        assert!(replica
            .apply(&SyncEvent::ColumnAdded {
                from: from("p2"),
                board_id,
                column: later.clone(),
            })
            .unwrap());
        assert_eq!(replica.board().columns.len(), 3);

        let done_column = replica.board().columns[1].clone();
        assert_eq!(done_column.id, done);
        assert!(replica
            .apply(&SyncEvent::ColumnRemoved {
                from: from("p2"),
                board_id,
                column: done_column,
            })
            .unwrap());
        assert_eq!(replica.board().column_ids(), vec![replica.board().columns[0].id, later.id]);
    }
}
