//! Document store adapters.
//!
//! - `in_memory` - Process-local store for development and tests

mod in_memory;

pub use in_memory::InMemoryDocumentStore;
