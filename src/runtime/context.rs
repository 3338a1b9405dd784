//! Interop Context
//!
//! One context per worker thread or task. It owns the worker's staging
//! buffer and its callback registry, so their lifetime is visible at the
//! call site instead of hiding in thread-local state. A context is `Send`
//! but is used by one caller at a time: every operation takes `&mut self`.

use libc::c_char;

use super::buffer_pool::{BufferArena, BufferPool, PinnedBuffer};
use crate::ffi::codec;
use crate::ffi::{
    CallbackRegistry, FfiResult, InvocationPointer, NotifyFn, TextFn, ValueFn,
};

/// Per-worker boundary state
#[derive(Default)]
pub struct InteropContext {
    buffers: BufferPool,
    callbacks: CallbackRegistry,
}

impl InteropContext {
    /// Create a context whose buffer is a standalone allocation
    pub fn new() -> Self {
        tracing::debug!("created interop context");
        Self::default()
    }

    /// Create a context whose buffer is leased from a shared arena
    pub fn with_arena(arena: BufferArena) -> Self {
        tracing::debug!(arena_available = arena.available(), "created interop context");
        Self {
            buffers: BufferPool::with_arena(arena),
            callbacks: CallbackRegistry::new(),
        }
    }

    /// Get the zero-filled staging buffer
    pub fn buffer(&mut self) -> &mut PinnedBuffer {
        self.buffers.acquire()
    }

    /// Let `fill` write a NUL-terminated value into the staging buffer and
    /// decode it
    pub fn fill_text<F>(&mut self, fill: F) -> String
    where
        F: FnOnce(&mut [u8]),
    {
        let buffer = self.buffers.acquire();
        fill(buffer.as_mut_slice());
        buffer.read_text()
    }

    /// Run a native call that fills a `(char *out, size_t capacity)` buffer
    /// and decode the result.
    ///
    /// ```ignore
    /// let name = ctx.read_text(|out, cap| unsafe { engine_project_name(out, cap) });
    /// ```
    pub fn read_text<F>(&mut self, call: F) -> String
    where
        F: FnOnce(*mut c_char, usize),
    {
        let buffer = self.buffers.acquire();
        let capacity = buffer.capacity();
        call(buffer.as_mut_c_ptr(), capacity);
        buffer.read_text()
    }

    /// Stage `text` and run a native call that reads it as `const char *`.
    ///
    /// An absent value reaches the call as a null pointer and nothing is
    /// written to the buffer.
    pub fn with_text<F, R>(&mut self, text: Option<&str>, call: F) -> FfiResult<R>
    where
        F: FnOnce(*const c_char) -> R,
    {
        let buffer = self.buffers.acquire();
        match buffer.write_text(text)? {
            Some(_) => Ok(call(buffer.as_c_ptr())),
            None => Ok(call(std::ptr::null())),
        }
    }

    /// Like [`with_text`](Self::with_text), but an absent value is an
    /// invalid-argument error and the native call is not made
    pub fn with_required_text<F, R>(
        &mut self,
        text: Option<&str>,
        what: &str,
        call: F,
    ) -> FfiResult<R>
    where
        F: FnOnce(*const c_char) -> R,
    {
        let text = codec::require(text, what)?;
        self.with_text(Some(text), call)
    }

    /// Retain a notify callback for the life of this context.
    ///
    /// The returned pointer dangles once the context is dropped. A callback
    /// native code keeps past this context (engine ticks, log sinks) must be
    /// registered through [`CallbackRegistry::process_wide`] instead.
    pub fn register_notify<F>(&mut self, callback: F) -> InvocationPointer<NotifyFn>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.register_notify(callback)
    }

    /// Retain a text callback for the life of this context.
    ///
    /// Same lifetime rule as [`register_notify`](Self::register_notify).
    pub fn register_text<F>(&mut self, callback: F) -> InvocationPointer<TextFn>
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        self.callbacks.register_text(callback)
    }

    /// Retain a value callback for the life of this context.
    ///
    /// Same lifetime rule as [`register_notify`](Self::register_notify).
    pub fn register_value<F>(&mut self, callback: F) -> InvocationPointer<ValueFn>
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        self.callbacks.register_value(callback)
    }

    /// Callbacks retained by this context
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Check if the staging buffer has been created yet
    pub fn has_buffer(&self) -> bool {
        self.buffers.is_allocated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::{FfiError, TEXT_BUFFER_CAPACITY};
    use std::ffi::CStr;

    unsafe extern "C" fn fake_project_name(out: *mut c_char, capacity: usize) {
        let name = b"Sample Project\0";
        assert!(capacity >= name.len());
        std::ptr::copy_nonoverlapping(name.as_ptr() as *const c_char, out, name.len());
    }

    #[test]
    fn test_read_text_from_native_fill() {
        let mut ctx = InteropContext::new();
        assert!(!ctx.has_buffer());

        let name = ctx.read_text(|out, cap| unsafe { fake_project_name(out, cap) });
        assert_eq!(name, "Sample Project");
        assert!(ctx.has_buffer());
    }

    #[test]
    fn test_read_text_sees_full_capacity() {
        let mut ctx = InteropContext::new();
        let mut seen = 0;
        ctx.read_text(|_, cap| seen = cap);
        assert_eq!(seen, TEXT_BUFFER_CAPACITY);
    }

    #[test]
    fn test_no_leak_between_reads() {
        let mut ctx = InteropContext::new();
        let first = ctx.fill_text(|out| out[..11].copy_from_slice(b"long string"));
        assert_eq!(first, "long string");

        let second = ctx.fill_text(|out| out[..2].copy_from_slice(b"ok"));
        assert_eq!(second, "ok");

        let third = ctx.fill_text(|_| {});
        assert_eq!(third, "");
    }

    #[test]
    fn test_with_text_passes_terminated_string() {
        let mut ctx = InteropContext::new();
        let echoed = ctx
            .with_text(Some("level_01"), |ptr| unsafe {
                CStr::from_ptr(ptr).to_str().unwrap().to_owned()
            })
            .unwrap();
        assert_eq!(echoed, "level_01");
    }

    #[test]
    fn test_with_text_absent_is_null() {
        let mut ctx = InteropContext::new();
        let was_null = ctx.with_text(None, |ptr| ptr.is_null()).unwrap();
        assert!(was_null);
    }

    #[test]
    fn test_with_required_text_absent_skips_call() {
        let mut ctx = InteropContext::new();
        let mut called = false;
        let err = ctx
            .with_required_text(None, "scene path", |_| called = true)
            .unwrap_err();

        assert!(!called);
        assert_eq!(err, FfiError::InvalidArgument("scene path is required".into()));
    }

    #[test]
    fn test_with_text_over_capacity_skips_call() {
        let mut ctx = InteropContext::new();
        let oversized = "a".repeat(TEXT_BUFFER_CAPACITY + 1);
        let mut called = false;

        let err = ctx.with_text(Some(&oversized), |_| called = true).unwrap_err();
        assert!(!called);
        assert_eq!(
            err,
            FfiError::CapacityExceeded {
                len: TEXT_BUFFER_CAPACITY + 1,
                capacity: TEXT_BUFFER_CAPACITY
            }
        );
    }

    #[test]
    fn test_callbacks_are_context_local() {
        let mut a = InteropContext::new();
        let b = InteropContext::new();

        a.register_notify(|| {});
        a.register_value(|_| {});
        a.register_text(|_| {});

        assert_eq!(a.callbacks().len(), 3);
        assert!(b.callbacks().is_empty());
    }

    #[test]
    fn test_process_wide_callback_outlives_context() {
        use std::sync::atomic::{AtomicI64, Ordering};
        use std::sync::Arc;

        let last = Arc::new(AtomicI64::new(0));
        let mut ctx = InteropContext::new();
        ctx.register_value(|_| {});

        let sink = Arc::clone(&last);
        let ptr = CallbackRegistry::process_wide()
            .lock()
            .register_value(move |v| sink.store(v, Ordering::SeqCst));

        drop(ctx);

        unsafe { (ptr.code())(ptr.user_data(), 99) };
        assert_eq!(last.load(Ordering::SeqCst), 99);
    }

    #[test]
    fn test_context_with_arena_returns_slot_on_drop() {
        let arena = BufferArena::new(2).unwrap();
        let mut ctx = InteropContext::with_arena(arena.clone());
        ctx.buffer();
        assert_eq!(arena.in_use(), 1);

        drop(ctx);
        assert_eq!(arena.in_use(), 0);
    }
}
