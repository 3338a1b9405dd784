//! Engine Surface
//!
//! The native queries a handle needs. Implemented by [`NativeEngine`] over
//! the engine's C symbols, and by test doubles.
//!
//! [`NativeEngine`]: super::NativeEngine

use super::types::{NativeKind, RawPtr};

/// Liveness and accessor queries exposed by the native runtime.
///
/// Accessors are only ever called after `is_alive` returned true for the
/// same address and kind.
pub trait EngineSurface: Send + Sync {
    /// Is `raw` still a live object of `kind`?
    fn is_alive(&self, kind: NativeKind, raw: RawPtr) -> bool;

    /// Engine-assigned identifier of a live object
    fn object_id(&self, kind: NativeKind, raw: RawPtr) -> i64;

    /// Write the object's NUL-terminated UTF-8 name into `out`
    fn object_name(&self, kind: NativeKind, raw: RawPtr, out: &mut [u8]);
}
