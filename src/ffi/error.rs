//! Boundary error type
//!
//! Every failure here is a usage error surfaced to the immediate caller.
//! None of them are transient, so nothing in the crate retries.

use thiserror::Error;

/// Error type for boundary operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FfiError {
    /// A required argument was absent or unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Accessor invoked on a handle whose native object is not live
    #[error("Invalid state: {kind} handle {raw:#x} is {state}")]
    InvalidState {
        kind: &'static str,
        raw: usize,
        state: &'static str,
    },

    /// Encoded text does not fit the staging buffer
    #[error("Capacity exceeded: {len} bytes do not fit a {capacity}-byte buffer")]
    CapacityExceeded { len: usize, capacity: usize },

    /// Failed to load the engine library
    #[error("Load error: {0}")]
    LoadError(String),

    /// Symbol not found in the engine library
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Symbol name cannot be passed to the loader
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),
}

/// Result type for boundary operations
pub type FfiResult<T> = Result<T, FfiError>;
