//! In-memory document store.
//!
//! Holds boards, teams, items, and linked accounts in process memory. It
//! implements both `DocumentStore` and `AccountDirectory`, so a single
//! instance can back every persistence port in development and tests.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(InMemoryDocumentStore::new());
//! store.insert_board(board).await;
//!
//! let loaded = store.board(&board_id).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::board::{Board, Item, Team};
use crate::domain::foundation::{AccountId, BoardId, ItemId, TeamId};
use crate::ports::{AccountDirectory, DocumentStore, ExternalAccount, StoreError};

/// In-memory store keyed by document id.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    boards: RwLock<HashMap<BoardId, Board>>,
    teams: RwLock<HashMap<TeamId, Team>>,
    items: RwLock<HashMap<ItemId, Item>>,
    accounts: RwLock<HashMap<AccountId, ExternalAccount>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // === Seeding ===

    pub async fn insert_board(&self, board: Board) {
        self.boards.write().await.insert(board.id, board);
    }

    pub async fn insert_team(&self, team: Team) {
        self.teams.write().await.insert(team.id, team);
    }

    pub async fn insert_item(&self, item: Item) {
        self.items.write().await.insert(item.id, item);
    }

    pub async fn insert_account(&self, account: ExternalAccount) {
        self.accounts.write().await.insert(account.id, account);
    }

    /// Flags an account archived. Returns false if it does not exist.
    pub async fn archive_account(&self, id: &AccountId) -> bool {
        match self.accounts.write().await.get_mut(id) {
            Some(account) => {
                account.archived = true;
                true
            }
            None => false,
        }
    }

    // === Test Helpers ===

    pub async fn item_count(&self) -> usize {
        self.items.read().await.len()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn board(&self, id: &BoardId) -> Result<Option<Board>, StoreError> {
        Ok(self.boards.read().await.get(id).cloned())
    }

    async fn save_board(&self, board: &Board) -> Result<(), StoreError> {
        self.boards.write().await.insert(board.id, board.clone());
        Ok(())
    }

    async fn team(&self, id: &TeamId) -> Result<Option<Team>, StoreError> {
        Ok(self.teams.read().await.get(id).cloned())
    }

    async fn item(&self, id: &ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn save_item(&self, item: &Item) -> Result<(), StoreError> {
        self.items.write().await.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete_item(&self, id: &ItemId) -> Result<(), StoreError> {
        self.items.write().await.remove(id);
        Ok(())
    }

    async fn items_on_board(&self, board_id: &BoardId) -> Result<Vec<Item>, StoreError> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .filter(|item| &item.board_id == board_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AccountDirectory for InMemoryDocumentStore {
    async fn account(&self, id: &AccountId) -> Result<Option<ExternalAccount>, StoreError> {
        Ok(self.accounts.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::board::Column;
    use crate::domain::foundation::{ColumnId, UserId};
    use crate::domain::sync::Provider;

    #[tokio::test]
    async fn items_on_board_filters_by_board() {
        let store = InMemoryDocumentStore::new();
        let board_a = BoardId::new();
        let board_b = BoardId::new();
        let column = ColumnId::new();

        store.insert_item(Item::new("a1", board_a, column, 0)).await;
        store.insert_item(Item::new("a2", board_a, column, 1)).await;
        store.insert_item(Item::new("b1", board_b, column, 0)).await;

        assert_eq!(store.items_on_board(&board_a).await.unwrap().len(), 2);
        assert_eq!(store.items_on_board(&board_b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_then_delete_item() {
        let store = InMemoryDocumentStore::new();
        let item = Item::new("card", BoardId::new(), ColumnId::new(), 0);

        store.save_item(&item).await.unwrap();
        assert_eq!(store.item(&item.id).await.unwrap(), Some(item.clone()));

        store.delete_item(&item.id).await.unwrap();
        assert_eq!(store.item(&item.id).await.unwrap(), None);
        assert_eq!(store.item_count().await, 0);
    }

    #[tokio::test]
    async fn save_board_overwrites() {
        let store = InMemoryDocumentStore::new();
        let mut board = Board::new(UserId::new("u-1").unwrap(), "Plan", vec![Column::new("To do")]);
        store.insert_board(board.clone()).await;

        board.name = "Renamed".to_string();
        store.save_board(&board).await.unwrap();

        assert_eq!(store.board(&board.id).await.unwrap().unwrap().name, "Renamed");
    }

    #[tokio::test]
    async fn archive_account_flags_it() {
        let store = InMemoryDocumentStore::new();
        let account = ExternalAccount::new(Provider::Chat, UserId::new("u-1").unwrap(), "Work");
        let id = account.id;
        store.insert_account(account).await;

        assert!(store.archive_account(&id).await);
        assert!(store.account(&id).await.unwrap().unwrap().archived);
        assert!(!store.archive_account(&AccountId::new()).await);
    }
}
