//! Application handlers.
//!
//! Command handlers for items and columns, serialized per board.

mod board_locks;
mod items;

pub use board_locks::{BoardGuard, BoardLocks};
pub use items::ItemService;
