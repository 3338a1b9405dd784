//! Engine Interop - Marshaling layer for a native engine's C surface
//!
//! Application code talks to a native engine runtime that exposes nothing but
//! C function pointers. Everything crossing that boundary goes through three
//! mechanisms in this crate:
//!
//! - **Text marshaling**: a pinned, zero-filled 8 KiB staging buffer per
//!   execution context, plus a stateless UTF-8 codec with scan-to-NUL
//!   decoding. No allocation per crossing.
//! - **Callback retention**: a registry that keeps every callback handed to
//!   native code alive and gives out a stable `(trampoline, user_data)` pair.
//! - **Native handles**: weak references to engine-owned objects whose
//!   liveness is re-checked with the engine on every access.
//!
//! # Example
//!
//! ```rust
//! use engine_interop::runtime::InteropContext;
//!
//! let mut ctx = InteropContext::new();
//!
//! // Stand-in for a native call that fills `(char *out, size_t capacity)`
//! let name = ctx.fill_text(|out| out[..5].copy_from_slice(b"Hello"));
//! assert_eq!(name, "Hello");
//!
//! // The next crossing starts from a zeroed buffer
//! assert_eq!(ctx.fill_text(|_| {}), "");
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ Application code │
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐     ┌─────────────┐
//! │  InteropContext  │────▶│ BufferArena │  pinned 8 KiB blocks
//! └────────┬─────────┘     └─────────────┘
//!          │ callbacks / handles
//!          ▼
//! ┌──────────────────┐
//! │   NativeEngine   │  libloading + C function table
//! └──────────────────┘
//! ```

pub mod config;
pub mod ffi;
pub mod runtime;

pub use config::{
    BufferConfig, ConfigError, EngineConfig, InteropConfig, SymbolConfig, MAX_ARENA_SLOTS,
};
pub use ffi::{
    CallbackRegistry, EngineSurface, FfiError, FfiResult, HandleKind, HandleState,
    InvocationPointer, NativeEngine, NativeHandle, ObjectHandle, RawPtr, TEXT_BUFFER_CAPACITY,
};
pub use runtime::{BufferArena, BufferPool, InteropContext, PinnedBuffer};
