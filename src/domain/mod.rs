//! Domain layer - boards, ordering, and the sync vocabulary.

pub mod board;
pub mod foundation;
pub mod sync;
