//! Streaming provider adapters.
//!
//! Real chat and mail clients live outside this crate and plug in through
//! the `StreamingProvider` port.
//!
//! - `mock` - Scriptable provider for tests

mod mock;

pub use mock::MockStreamingProvider;
