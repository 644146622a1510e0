//! DocumentStore port - get/save-by-id persistence for boards and items.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::board::{Board, Item, Team};
use crate::domain::foundation::{BoardId, DomainError, ErrorCode, ItemId, TeamId};

/// Errors surfaced by document store implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        DomainError::new(ErrorCode::StoreError, err.to_string())
    }
}

/// Document store holding boards, teams, and items by id.
///
/// `items_on_board` is the one query beyond plain get/save; it is what a
/// board's position index is rebuilt from.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn board(&self, id: &BoardId) -> Result<Option<Board>, StoreError>;

    async fn save_board(&self, board: &Board) -> Result<(), StoreError>;

    async fn team(&self, id: &TeamId) -> Result<Option<Team>, StoreError>;

    async fn item(&self, id: &ItemId) -> Result<Option<Item>, StoreError>;

    async fn save_item(&self, item: &Item) -> Result<(), StoreError>;

    async fn delete_item(&self, id: &ItemId) -> Result<(), StoreError>;

    async fn items_on_board(&self, board_id: &BoardId) -> Result<Vec<Item>, StoreError>;
}
