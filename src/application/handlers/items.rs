//! ItemService - Command handlers for items and columns.
//!
//! Every operation follows the same shape:
//! 1. Lock the affected board(s)
//! 2. Load and authorize
//! 3. Rebuild the position index from stored items
//! 4. Apply the operation
//! 5. Persist every placement that changed
//! 6. Publish the resulting sync event(s)

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::application::access;
use crate::domain::board::{Board, Column, Item, PositionChange, PositionEngine};
use crate::domain::foundation::{
    AuthenticatedUser, BoardId, ColumnId, DomainError, ErrorCode, ItemId, UserId, ValidationError,
};
use crate::domain::sync::{DomainEvent, Scope, SyncEvent};
use crate::ports::{DispatchReport, DocumentStore, SyncPublisher};

use super::board_locks::{BoardGuard, BoardLocks};

/// Attempts at pinning an item's board before giving up.
const LOCK_ATTEMPTS: usize = 3;

/// Handler for item and column commands.
pub struct ItemService {
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn SyncPublisher>,
    locks: BoardLocks,
}

impl ItemService {
    pub fn new(store: Arc<dyn DocumentStore>, publisher: Arc<dyn SyncPublisher>) -> Self {
        Self {
            store,
            publisher,
            locks: BoardLocks::new(),
        }
    }

    /// Adds an item at `pos` (clamped) of a column. A stale column puts the
    /// item at the head of the board's default column.
    pub async fn add_item(
        &self,
        actor: &AuthenticatedUser,
        board_id: BoardId,
        column_id: ColumnId,
        pos: usize,
        title: String,
    ) -> Result<Item, DomainError> {
        let title = non_blank("title", title)?;

        let _guard = self.locks.lock(&[board_id]).await;
        let board = access::visible_board(self.store.as_ref(), &actor.id, board_id).await?;
        let mut workspace = self.hydrate(&[&board]).await?;

        let mut item = Item::new(title, board_id, column_id, pos);
        let update = workspace.engine.insert(item.id, board_id, column_id, pos)?;
        if let Some(to) = update.to {
            item.column_id = to.column_id;
            item.pos = to.pos;
        }

        workspace.track(item.clone());
        workspace.apply(&update.shifted);
        workspace.persist(self.store.as_ref()).await?;

        self.publish(
            &board,
            SyncEvent::ItemAdded {
                from: actor.originator(),
                item: item.clone(),
            },
        )
        .await;
        Ok(item)
    }

    pub async fn edit_item(
        &self,
        actor: &AuthenticatedUser,
        item_id: ItemId,
        title: String,
    ) -> Result<Item, DomainError> {
        let title = non_blank("title", title)?;

        let (_guard, mut item) = self.lock_item(item_id, None).await?;
        let board = access::visible_board(self.store.as_ref(), &actor.id, item.board_id).await?;

        item.title = title;
        self.store.save_item(&item).await?;

        self.publish(
            &board,
            SyncEvent::ItemEdited {
                from: actor.originator(),
                item: item.clone(),
            },
        )
        .await;
        Ok(item)
    }

    /// Moves an item, possibly onto another board.
    ///
    /// A move onto the item's current position is a no-op: nothing is
    /// written and nothing is published.
    pub async fn move_item(
        &self,
        actor: &AuthenticatedUser,
        item_id: ItemId,
        to_board_id: BoardId,
        to_column_id: ColumnId,
        to_pos: usize,
    ) -> Result<Item, DomainError> {
        let (_guard, item) = self.lock_item(item_id, Some(to_board_id)).await?;
        let source = access::visible_board(self.store.as_ref(), &actor.id, item.board_id).await?;
        let target = if to_board_id == source.id {
            None
        } else {
            Some(access::visible_board(self.store.as_ref(), &actor.id, to_board_id).await?)
        };

        let boards: Vec<&Board> = std::iter::once(&source).chain(target.as_ref()).collect();
        let mut workspace = self.hydrate(&boards).await?;

        let update = workspace
            .engine
            .move_item(item_id, to_board_id, to_column_id, to_pos)?;
        let Some(from) = update.from else {
            return Err(missing_item(item_id));
        };
        if update.is_noop() {
            workspace.persist(self.store.as_ref()).await?;
            return workspace.item(item_id);
        }

        workspace.apply(&update.changes());
        workspace.persist(self.store.as_ref()).await?;
        let moved = workspace.item(item_id)?;

        match target {
            None => {
                self.publish(
                    &source,
                    SyncEvent::ItemPositionUpdated {
                        from: actor.originator(),
                        item: moved.clone(),
                        old_column_id: from.column_id,
                    },
                )
                .await;
            }
            Some(target) => {
                self.publish(
                    &source,
                    SyncEvent::ItemRemoved {
                        from: actor.originator(),
                        item: moved.clone(),
                        old_board_id: from.board_id,
                        old_column_id: from.column_id,
                    },
                )
                .await;
                self.publish(
                    &target,
                    SyncEvent::ItemAdded {
                        from: actor.originator(),
                        item: moved.clone(),
                    },
                )
                .await;
            }
        }
        Ok(moved)
    }

    pub async fn remove_item(&self, actor: &AuthenticatedUser, item_id: ItemId) -> Result<Item, DomainError> {
        let (_guard, item) = self.lock_item(item_id, None).await?;
        let board = access::visible_board(self.store.as_ref(), &actor.id, item.board_id).await?;
        let mut workspace = self.hydrate(&[&board]).await?;

        let update = workspace.engine.remove(item_id)?;
        let Some(from) = update.from else {
            return Err(missing_item(item_id));
        };
        let mut removed = workspace.forget(item_id)?;
        removed.column_id = from.column_id;
        removed.pos = from.pos;

        workspace.apply(&update.shifted);
        workspace.persist(self.store.as_ref()).await?;
        self.store.delete_item(&item_id).await?;

        self.publish(
            &board,
            SyncEvent::ItemRemoved {
                from: actor.originator(),
                item: removed.clone(),
                old_board_id: from.board_id,
                old_column_id: from.column_id,
            },
        )
        .await;
        Ok(removed)
    }

    /// Moves an item back to the head of the column it last left, or of
    /// the board's first column if that one is gone.
    pub async fn reopen_item(&self, actor: &AuthenticatedUser, item_id: ItemId) -> Result<Item, DomainError> {
        let (_guard, item) = self.lock_item(item_id, None).await?;
        let board = access::visible_board(self.store.as_ref(), &actor.id, item.board_id).await?;
        let mut workspace = self.hydrate(&[&board]).await?;

        let update = workspace.engine.reopen(item_id)?;
        let Some(from) = update.from else {
            return Err(missing_item(item_id));
        };
        if update.is_noop() {
            workspace.persist(self.store.as_ref()).await?;
            return workspace.item(item_id);
        }

        workspace.apply(&update.changes());
        workspace.persist(self.store.as_ref()).await?;
        let reopened = workspace.item(item_id)?;

        self.publish(
            &board,
            SyncEvent::ItemPositionUpdated {
                from: actor.originator(),
                item: reopened.clone(),
                old_column_id: from.column_id,
            },
        )
        .await;
        Ok(reopened)
    }

    pub async fn add_column(
        &self,
        actor: &AuthenticatedUser,
        board_id: BoardId,
        name: String,
    ) -> Result<Column, DomainError> {
        let name = non_blank("name", name)?;

        let _guard = self.locks.lock(&[board_id]).await;
        let mut board = access::visible_board(self.store.as_ref(), &actor.id, board_id).await?;

        let column = Column::new(name);
        board.columns.push(column.clone());
        self.store.save_board(&board).await?;

        self.publish(
            &board,
            SyncEvent::ColumnAdded {
                from: actor.originator(),
                board_id,
                column: column.clone(),
            },
        )
        .await;
        Ok(column)
    }

    /// Removes an empty column. The board's last column cannot be removed.
    pub async fn remove_column(
        &self,
        actor: &AuthenticatedUser,
        board_id: BoardId,
        column_id: ColumnId,
    ) -> Result<(), DomainError> {
        let _guard = self.locks.lock(&[board_id]).await;
        let mut board = access::visible_board(self.store.as_ref(), &actor.id, board_id).await?;

        let Some(column) = board.columns.iter().find(|c| c.id == column_id).cloned() else {
            return Err(DomainError::new(
                ErrorCode::ColumnNotFound,
                format!("Column {} not found on board {}", column_id, board_id),
            ));
        };
        if board.columns.len() == 1 {
            return Err(DomainError::new(
                ErrorCode::NoColumns,
                format!("Board {} must keep at least one column", board_id),
            ));
        }

        let mut workspace = self.hydrate(&[&board]).await?;
        workspace.engine.remove_column(board_id, column_id)?;

        board.columns.retain(|c| c.id != column_id);
        self.store.save_board(&board).await?;

        self.publish(
            &board,
            SyncEvent::ColumnRemoved {
                from: actor.originator(),
                board_id,
                column,
            },
        )
        .await;
        Ok(())
    }

    // === Internals ===

    /// Locks the board an item currently sits on (plus `extra`) and returns
    /// the item as read under that lock.
    async fn lock_item(
        &self,
        item_id: ItemId,
        extra: Option<BoardId>,
    ) -> Result<(BoardGuard, Item), DomainError> {
        for _ in 0..LOCK_ATTEMPTS {
            let seen = self.load_item(item_id).await?;
            let boards: Vec<BoardId> = std::iter::once(seen.board_id).chain(extra).collect();
            let guard = self.locks.lock(&boards).await;

            let current = self.load_item(item_id).await?;
            if current.board_id == seen.board_id {
                return Ok((guard, current));
            }
        }
        Err(DomainError::new(
            ErrorCode::InternalError,
            format!("Item {} kept moving between boards", item_id),
        ))
    }

    async fn load_item(&self, item_id: ItemId) -> Result<Item, DomainError> {
        self.store
            .item(&item_id)
            .await?
            .ok_or_else(|| missing_item(item_id))
    }

    async fn hydrate(&self, boards: &[&Board]) -> Result<Workspace, DomainError> {
        let mut workspace = Workspace::default();
        for board in boards {
            let items = self.store.items_on_board(&board.id).await?;
            let repairs = workspace.engine.hydrate(board, &items);
            for item in items {
                workspace.items.insert(item.id, item);
            }
            if !repairs.is_empty() {
                tracing::warn!(
                    board_id = %board.id,
                    repaired = repairs.len(),
                    "Stored positions were not contiguous"
                );
            }
            workspace.apply(&repairs);
        }
        Ok(workspace)
    }

    /// Sends to the board's listeners and to the broader scope the board
    /// lives in: its team when shared, its owner otherwise.
    async fn publish(&self, board: &Board, payload: SyncEvent) -> DispatchReport {
        let broader = match board.team_id {
            Some(team_id) => Scope::Team(team_id),
            None => Scope::User(board.owner.clone()),
        };
        let event = DomainEvent::new(Scope::Board(board.id), payload)
            .also_to(broader)
            .with_allow(audience(board));
        self.publisher.dispatch(event).await
    }
}

/// Principals allowed to receive a board's events; `None` when every
/// listener may.
fn audience(board: &Board) -> Option<HashSet<UserId>> {
    if board.is_shared() {
        board.audience()
    } else {
        Some(HashSet::from([board.owner.clone()]))
    }
}

fn non_blank(field: &str, value: String) -> Result<String, ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::empty_field(field));
    }
    Ok(value)
}

fn missing_item(item_id: ItemId) -> DomainError {
    DomainError::new(ErrorCode::ItemNotFound, format!("Item {} not found", item_id))
}

/// Items of the locked boards plus their rebuilt position index.
#[derive(Default)]
struct Workspace {
    engine: PositionEngine,
    items: HashMap<ItemId, Item>,
    dirty: HashSet<ItemId>,
}

impl Workspace {
    fn track(&mut self, item: Item) {
        self.dirty.insert(item.id);
        self.items.insert(item.id, item);
    }

    fn forget(&mut self, item_id: ItemId) -> Result<Item, DomainError> {
        self.dirty.remove(&item_id);
        self.items.remove(&item_id).ok_or_else(|| missing_item(item_id))
    }

    fn item(&self, item_id: ItemId) -> Result<Item, DomainError> {
        self.items.get(&item_id).cloned().ok_or_else(|| missing_item(item_id))
    }

    fn apply(&mut self, changes: &[PositionChange]) {
        for change in changes {
            if let Some(item) = self.items.get_mut(&change.item_id) {
                item.place(change.placement);
                self.dirty.insert(change.item_id);
            }
        }
    }

    async fn persist(&mut self, store: &dyn DocumentStore) -> Result<(), DomainError> {
        for item_id in self.dirty.drain() {
            if let Some(item) = self.items.get(&item_id) {
                store.save_item(item).await?;
            }
        }
        Ok(())
    }
}
