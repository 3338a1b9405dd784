//! FFI Module
//!
//! The three places where a boundary mistake corrupts memory, leaks, or
//! reads freed objects: text marshaling, callback retention, and handles to
//! engine-owned objects.
//!
//! # Architecture
//!
//! ```text
//! Application code
//!       │
//!       ├── text ──────▶ InteropContext buffer ──▶ native fills / reads ──▶ codec::decode
//!       │
//!       ├── callback ──▶ CallbackRegistry ──▶ InvocationPointer ──▶ native stores, fires later
//!       │
//!       └── object ────▶ NativeHandle ──▶ EngineSurface::is_alive ──▶ accessor query
//!                                              │
//!                                              ▼
//!                                   NativeEngine (libloading)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let config = InteropConfig::load_from_cwd()?;
//! let engine: Arc<dyn EngineSurface> = Arc::new(NativeEngine::from_config(&config)?);
//! let mut ctx = InteropContext::with_arena(BufferArena::from_config(&config.buffers)?);
//!
//! let player = ObjectHandle::new(RawPtr::from_ptr(raw), engine);
//! if player.is_created() {
//!     println!("{} = {}", player.id()?, player.name(&mut ctx)?);
//! }
//! ```

pub mod codec;
mod callbacks;
mod error;
mod handle;
mod loader;
mod surface;
mod types;

pub use callbacks::{CallbackId, CallbackRegistry, InvocationPointer};
pub use error::{FfiError, FfiResult};
pub use handle::{HandleKind, HandleState, NativeHandle, Object, ObjectHandle};
pub use loader::{EngineVTable, NativeEngine};
pub use surface::EngineSurface;
pub use types::{
    CallbackShape, IsAliveFn, NativeKind, NotifyFn, ObjectIdFn, ObjectNameFn, RawPtr, TextFn,
    ValueFn, TEXT_BUFFER_CAPACITY,
};
