//! Callback Registry
//!
//! Native code has no way to keep a Rust closure alive. A callback handed
//! across the boundary is retained here, boxed so its address never moves,
//! and stays reachable for the whole life of the registry. Entries are never
//! evicted: the registry is meant for "fire occasionally, live forever"
//! callbacks such as engine ticks, log sinks and async completions, not for
//! high-churn registration.
//!
//! Native code receives an [`InvocationPointer`]: a C-ABI trampoline plus
//! the `user_data` address it must pass back. The trampoline recovers the
//! closure from `user_data`, converts the arguments, and stops any panic
//! before it can unwind into native frames.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use libc::{c_char, c_void};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::codec;
use super::types::{CallbackShape, NotifyFn, TextFn, ValueFn};

type NotifyCallback = Box<dyn Fn() + Send + Sync>;
type TextCallback = Box<dyn Fn(Option<&str>) + Send + Sync>;
type ValueCallback = Box<dyn Fn(i64) + Send + Sync>;

static PROCESS_REGISTRY: Lazy<Mutex<CallbackRegistry>> =
    Lazy::new(|| Mutex::new(CallbackRegistry::new()));

/// Identifier of a retained callback, unique within its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Get the raw identifier
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb#{}", self.0)
    }
}

/// What native code stores to reach a registered callback.
///
/// Invoke as `code(user_data, args...)`. Both halves stay valid for as long
/// as the registry that produced them is alive. The type carries no lifetime:
/// the pointer is handed to native code, which the borrow checker cannot
/// follow. Dropping the registry (or the `InteropContext` that owns it)
/// leaves `user_data` dangling, so anything native code keeps indefinitely
/// belongs in [`CallbackRegistry::process_wide`].
#[derive(Debug, Clone, Copy)]
pub struct InvocationPointer<F> {
    id: CallbackId,
    code: F,
    user_data: *mut c_void,
}

impl<F: Copy> InvocationPointer<F> {
    /// Registry entry this pointer belongs to
    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// The C-ABI trampoline
    pub fn code(&self) -> F {
        self.code
    }

    /// The address to pass back as the trampoline's first argument
    pub fn user_data(&self) -> *mut c_void {
        self.user_data
    }
}

// Safety: user_data points at a Send + Sync closure the registry owns
unsafe impl<F: Send> Send for InvocationPointer<F> {}
unsafe impl<F: Sync> Sync for InvocationPointer<F> {}

/// A retained callback
struct CallbackEntry {
    id: CallbackId,
    shape: CallbackShape,
    /// Boxed closure; its heap address is the entry's user_data
    _target: Box<dyn Any + Send + Sync>,
}

/// Retaining list of native-invocable callbacks
#[derive(Default)]
pub struct CallbackRegistry {
    entries: Vec<CallbackEntry>,
    next_id: u64,
}

impl CallbackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that lives for the whole process
    pub fn process_wide() -> &'static Mutex<CallbackRegistry> {
        &PROCESS_REGISTRY
    }

    /// Retain a callback invoked as `void (*)(void *user_data)`
    pub fn register_notify<F>(&mut self, callback: F) -> InvocationPointer<NotifyFn>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let target: Box<NotifyCallback> = Box::new(Box::new(callback));
        let (id, user_data) = self.retain(CallbackShape::Notify, target);
        InvocationPointer {
            id,
            code: notify_trampoline as NotifyFn,
            user_data,
        }
    }

    /// Retain a callback invoked as `void (*)(void *user_data, const char *text)`.
    ///
    /// A null `text` reaches the closure as `None`.
    pub fn register_text<F>(&mut self, callback: F) -> InvocationPointer<TextFn>
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        let target: Box<TextCallback> = Box::new(Box::new(callback));
        let (id, user_data) = self.retain(CallbackShape::Text, target);
        InvocationPointer {
            id,
            code: text_trampoline as TextFn,
            user_data,
        }
    }

    /// Retain a callback invoked as `void (*)(void *user_data, int64_t value)`
    pub fn register_value<F>(&mut self, callback: F) -> InvocationPointer<ValueFn>
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        let target: Box<ValueCallback> = Box::new(Box::new(callback));
        let (id, user_data) = self.retain(CallbackShape::Value, target);
        InvocationPointer {
            id,
            code: value_trampoline as ValueFn,
            user_data,
        }
    }

    fn retain<C>(&mut self, shape: CallbackShape, target: Box<C>) -> (CallbackId, *mut c_void)
    where
        C: Any + Send + Sync,
    {
        self.next_id += 1;
        let id = CallbackId(self.next_id);

        // Moving the box below does not move the heap allocation
        let user_data = &*target as *const C as *mut c_void;
        self.entries.push(CallbackEntry {
            id,
            shape,
            _target: target,
        });

        tracing::trace!(%id, %shape, retained = self.entries.len(), "registered native callback");
        (id, user_data)
    }

    /// Get the number of retained callbacks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no callback has been registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if a callback is retained
    pub fn contains(&self, id: CallbackId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// List retained callbacks in registration order
    pub fn entries(&self) -> impl Iterator<Item = (CallbackId, CallbackShape)> + '_ {
        self.entries.iter().map(|entry| (entry.id, entry.shape))
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("retained", &self.entries.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

// =============================================================================
// Trampolines
// =============================================================================

unsafe extern "C" fn notify_trampoline(user_data: *mut c_void) {
    let Some(callback) = (user_data as *const NotifyCallback).as_ref() else {
        return;
    };
    contain_panic(CallbackShape::Notify, || callback());
}

unsafe extern "C" fn text_trampoline(user_data: *mut c_void, text: *const c_char) {
    let Some(callback) = (user_data as *const TextCallback).as_ref() else {
        return;
    };
    let text = codec::decode_c_str(text);
    contain_panic(CallbackShape::Text, || callback(text.as_deref()));
}

unsafe extern "C" fn value_trampoline(user_data: *mut c_void, value: i64) {
    let Some(callback) = (user_data as *const ValueCallback).as_ref() else {
        return;
    };
    contain_panic(CallbackShape::Value, || callback(value));
}

/// Run a callback body, logging instead of unwinding into native code
fn contain_panic(shape: CallbackShape, body: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string panic payload");
        tracing::error!(%shape, panic = message, "native callback panicked");
    }
}
