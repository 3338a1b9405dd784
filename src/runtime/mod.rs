//! Runtime module
//!
//! Per-worker boundary state: the pinned staging buffers and the context
//! object that owns one buffer and one callback registry.

pub mod buffer_pool;
pub mod context;

pub use buffer_pool::{BufferArena, BufferPool, PinnedBuffer, GUARD_BYTES};
pub use context::InteropContext;
