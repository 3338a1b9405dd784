//! Pinned staging buffers for boundary text
//!
//! Native calls that fill a caller-provided buffer are the dominant interop
//! pattern. Each execution context leases one fixed, address-stable block
//! the first time it needs one and reuses it for every later crossing, so
//! no crossing pays for an allocation.
//!
//! Blocks come from a [`BufferArena`]: one page-aligned allocation carved
//! into equal slots and handed out through a lock-free free list. Every
//! block is followed by a guard region that is never exposed as writable
//! capacity and always stays zero, so a value filling the whole capacity is
//! still NUL-terminated for a native reader.

use crossbeam::queue::ArrayQueue;
use libc::c_char;
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::{BufferConfig, MAX_ARENA_SLOTS};
use crate::ffi::codec;
use crate::ffi::{FfiError, FfiResult, TEXT_BUFFER_CAPACITY};

/// Zero bytes kept after every block
pub const GUARD_BYTES: usize = 64;

/// Distance between two slots in an arena
const SLOT_STRIDE: usize = TEXT_BUFFER_CAPACITY + GUARD_BYTES;

/// Alignment of every block allocation (one page)
const BLOCK_ALIGN: usize = 4096;

/// A fixed-capacity text buffer whose address never moves
pub struct PinnedBuffer {
    /// Start of the block
    ptr: NonNull<u8>,
    /// Arena the block was leased from, if any
    arena: Option<Arc<ArenaInner>>,
    /// Slot index in the arena
    index: usize,
}

impl PinnedBuffer {
    /// Allocate a block outside any arena
    fn standalone() -> Self {
        Self {
            ptr: allocate_zeroed(standalone_layout()),
            arena: None,
            index: 0,
        }
    }

    /// Create from an arena lease
    fn from_arena(ptr: NonNull<u8>, arena: Arc<ArenaInner>, index: usize) -> Self {
        Self {
            ptr,
            arena: Some(arena),
            index,
        }
    }

    /// Get a pointer to the buffer
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Get a mutable pointer to the buffer
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Get the buffer as a C string pointer for an outbound call
    pub fn as_c_ptr(&self) -> *const c_char {
        self.ptr.as_ptr() as *const c_char
    }

    /// Get the buffer as a C string pointer for native code to fill
    pub fn as_mut_c_ptr(&mut self) -> *mut c_char {
        self.ptr.as_ptr() as *mut c_char
    }

    /// Get buffer capacity
    pub fn capacity(&self) -> usize {
        TEXT_BUFFER_CAPACITY
    }

    /// Get the writable bytes
    pub fn as_slice(&self) -> &[u8] {
        // Safety: the block is at least TEXT_BUFFER_CAPACITY bytes, zero
        // initialized, and owned by self
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), TEXT_BUFFER_CAPACITY) }
    }

    /// Get the writable bytes mutably
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: as above, and &mut self makes the borrow exclusive
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), TEXT_BUFFER_CAPACITY) }
    }

    /// Zero-fill the writable bytes
    pub fn zero(&mut self) {
        self.as_mut_slice().fill(0);
    }

    /// Stage a text value for an outbound call
    pub fn write_text(&mut self, text: Option<&str>) -> FfiResult<Option<usize>> {
        codec::encode_into(text, self.as_mut_slice())
    }

    /// Decode the value currently held in the buffer
    pub fn read_text(&self) -> String {
        codec::decode(self.as_slice())
    }

    /// Check if the block was leased from an arena
    pub fn is_pooled(&self) -> bool {
        self.arena.is_some()
    }
}

impl Drop for PinnedBuffer {
    fn drop(&mut self) {
        if let Some(arena) = self.arena.take() {
            // Return to arena
            arena.release(self.index);
        } else {
            deallocate(self.ptr, standalone_layout());
        }
    }
}

// Safety: the block is exclusively owned by this value
unsafe impl Send for PinnedBuffer {}

/// Internal arena state
struct ArenaInner {
    /// Base pointer to all blocks
    base: NonNull<u8>,
    /// Total number of slots
    count: usize,
    /// Layout of the whole slab
    layout: Layout,
    /// Free list (lock-free queue of indices)
    free_list: ArrayQueue<usize>,
    /// Number of slots currently leased
    in_use: AtomicUsize,
}

impl ArenaInner {
    fn new(count: usize) -> FfiResult<Arc<Self>> {
        let layout = arena_layout(count)?;
        let base = allocate_zeroed(layout);

        let free_list = ArrayQueue::new(count);
        for i in 0..count {
            let _ = free_list.push(i);
        }

        Ok(Arc::new(Self {
            base,
            count,
            layout,
            free_list,
            in_use: AtomicUsize::new(0),
        }))
    }

    fn lease(self: &Arc<Self>) -> Option<PinnedBuffer> {
        let index = self.free_list.pop()?;
        self.in_use.fetch_add(1, Ordering::Relaxed);

        let offset = index * SLOT_STRIDE;
        let ptr = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) };

        Some(PinnedBuffer::from_arena(ptr, Arc::clone(self), index))
    }

    fn release(&self, index: usize) {
        // Scrub the slot, guard included
        let offset = index * SLOT_STRIDE;
        unsafe {
            std::ptr::write_bytes(self.base.as_ptr().add(offset), 0, SLOT_STRIDE);
        }

        let _ = self.free_list.push(index);
        self.in_use.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Drop for ArenaInner {
    fn drop(&mut self) {
        deallocate(self.base, self.layout);
    }
}

// Safety: slots are handed out exclusively through the lock-free free list
unsafe impl Send for ArenaInner {}
unsafe impl Sync for ArenaInner {}

/// Shared slab of pinned text buffers.
///
/// Cloning shares the same slab. A slot stays leased until the
/// [`PinnedBuffer`] holding it is dropped, which for a context's buffer means
/// until the context itself is dropped.
#[derive(Clone)]
pub struct BufferArena {
    inner: Arc<ArenaInner>,
}

impl BufferArena {
    /// Create an arena with the specified number of slots (at least one).
    ///
    /// More than [`MAX_ARENA_SLOTS`] slots is an invalid-argument error.
    pub fn new(slots: usize) -> FfiResult<Self> {
        let slots = slots.max(1);
        tracing::debug!(slots, slot_bytes = SLOT_STRIDE, "allocating buffer arena");
        Ok(Self {
            inner: ArenaInner::new(slots)?,
        })
    }

    /// Create an arena sized by configuration
    pub fn from_config(config: &BufferConfig) -> FfiResult<Self> {
        Self::new(config.arena_slots)
    }

    /// Lease a slot
    ///
    /// Returns None if all slots are in use.
    pub fn lease(&self) -> Option<PinnedBuffer> {
        self.inner.lease()
    }

    /// Get the number of slots currently leased
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Relaxed)
    }

    /// Get the total number of slots
    pub fn capacity(&self) -> usize {
        self.inner.count
    }

    /// Get the number of free slots
    pub fn available(&self) -> usize {
        self.capacity() - self.in_use()
    }
}

/// One execution context's staging buffer.
///
/// The buffer is created on the first [`acquire`](BufferPool::acquire) and
/// lives as long as the pool. `acquire` borrows the pool mutably, so a
/// buffer can never be handed to two calls at once.
#[derive(Default)]
pub struct BufferPool {
    arena: Option<BufferArena>,
    buffer: Option<PinnedBuffer>,
}

impl BufferPool {
    /// Create a pool that allocates its own block on first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool that leases its block from `arena` on first use
    pub fn with_arena(arena: BufferArena) -> Self {
        Self {
            arena: Some(arena),
            buffer: None,
        }
    }

    /// Get this context's buffer, zero-filled.
    ///
    /// The same block is returned every time. Anything read out of it must be
    /// copied before the next `acquire`.
    pub fn acquire(&mut self) -> &mut PinnedBuffer {
        let buffer = self
            .buffer
            .get_or_insert_with(|| Self::lease_block(self.arena.as_ref()));
        buffer.zero();
        buffer
    }

    /// Check if the block has been created yet
    pub fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    fn lease_block(arena: Option<&BufferArena>) -> PinnedBuffer {
        let Some(arena) = arena else {
            tracing::debug!("allocating standalone text buffer");
            return PinnedBuffer::standalone();
        };

        match arena.lease() {
            Some(buffer) => {
                tracing::debug!(in_use = arena.in_use(), "leased text buffer from arena");
                buffer
            }
            None => {
                tracing::warn!(
                    slots = arena.capacity(),
                    "buffer arena exhausted, allocating standalone text buffer"
                );
                PinnedBuffer::standalone()
            }
        }
    }
}

fn arena_layout(slots: usize) -> FfiResult<Layout> {
    let too_large = || {
        FfiError::InvalidArgument(format!(
            "buffer arena of {} slots exceeds the maximum of {}",
            slots, MAX_ARENA_SLOTS
        ))
    };
    if slots > MAX_ARENA_SLOTS {
        return Err(too_large());
    }
    let size = slots.checked_mul(SLOT_STRIDE).ok_or_else(too_large)?;
    Layout::from_size_align(size, BLOCK_ALIGN).map_err(|_| too_large())
}

fn standalone_layout() -> Layout {
    // Safety: BLOCK_ALIGN is a power of two and SLOT_STRIDE is far below
    // isize::MAX once rounded up to it
    unsafe { Layout::from_size_align_unchecked(SLOT_STRIDE, BLOCK_ALIGN) }
}

fn allocate_zeroed(layout: Layout) -> NonNull<u8> {
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    match NonNull::new(ptr) {
        Some(ptr) => ptr,
        None => alloc::handle_alloc_error(layout),
    }
}

fn deallocate(ptr: NonNull<u8>, layout: Layout) {
    unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
}
