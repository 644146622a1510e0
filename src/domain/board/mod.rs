//! Board module - boards, columns, items, and their ordering.
//!
//! The [`PositionEngine`] keeps items within each column in a gap-free
//! zero-based sequence and computes the placement changes every insert,
//! remove, and move produces.

mod documents;
mod item;
mod position;

pub use documents::{Board, Column, Team};
pub use item::{Item, Placement};
pub use position::{ColumnScope, PositionChange, PositionEngine, PositionError, PositionUpdate};
