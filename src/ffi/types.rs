//! Boundary Type System
//!
//! Raw address values and the C function shapes exchanged with the engine.

use std::fmt;

use libc::{c_char, c_void};

/// Capacity of every text staging buffer, in bytes
pub const TEXT_BUFFER_CAPACITY: usize = 8192;

/// An address-sized value handed out by the engine.
///
/// Only ever interpreted as zero / non-zero and compared for equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct RawPtr(usize);

impl RawPtr {
    /// The null address
    pub const NULL: RawPtr = RawPtr(0);

    /// Wrap an address-sized value
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Wrap a pointer returned by native code
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    /// Get the address value
    pub const fn addr(self) -> usize {
        self.0
    }

    /// Get the pointer to pass back to native code
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    /// Check if this is the null address
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for RawPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawPtr({:#x})", self.0)
    }
}

impl From<usize> for RawPtr {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

/// Kind tag passed to the engine's liveness and accessor queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NativeKind(pub u32);

impl NativeKind {
    /// Generic engine object
    pub const OBJECT: NativeKind = NativeKind(0);
}

impl fmt::Display for NativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kind#{}", self.0)
    }
}

/// `bool is_alive(uint32_t kind, void *raw)`
pub type IsAliveFn = unsafe extern "C" fn(kind: u32, raw: *mut c_void) -> bool;

/// `int64_t object_id(uint32_t kind, void *raw)`
pub type ObjectIdFn = unsafe extern "C" fn(kind: u32, raw: *mut c_void) -> i64;

/// `void object_name(uint32_t kind, void *raw, char *out, size_t capacity)`
pub type ObjectNameFn =
    unsafe extern "C" fn(kind: u32, raw: *mut c_void, out: *mut c_char, capacity: usize);

/// `void callback(void *user_data)`
pub type NotifyFn = unsafe extern "C" fn(user_data: *mut c_void);

/// `void callback(void *user_data, const char *text)`
pub type TextFn = unsafe extern "C" fn(user_data: *mut c_void, text: *const c_char);

/// `void callback(void *user_data, int64_t value)`
pub type ValueFn = unsafe extern "C" fn(user_data: *mut c_void, value: i64);

/// Shape of a native-invocable callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackShape {
    /// No payload
    Notify,
    /// NUL-terminated UTF-8 text payload
    Text,
    /// 64-bit signed integer payload
    Value,
}

impl fmt::Display for CallbackShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackShape::Notify => write!(f, "notify"),
            CallbackShape::Text => write!(f, "text"),
            CallbackShape::Value => write!(f, "value"),
        }
    }
}
