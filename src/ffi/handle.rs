//! Native Handle
//!
//! A weak, validity-checked reference to an engine-owned object. The engine
//! may destroy the object at any moment and later reuse its address for an
//! unrelated one, so a handle never trusts its pointer on its own: every
//! accessor and every equality check asks the engine whether the address is
//! still live first. The answer is never cached.
//!
//! ```text
//! Uninitialized (null) ──engine creates──▶ Created ──engine destroys──▶ Stale
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use super::error::{FfiError, FfiResult};
use super::surface::EngineSurface;
use super::types::{NativeKind, RawPtr};
use crate::runtime::InteropContext;

/// Marker for a kind of engine object
pub trait HandleKind: 'static {
    /// Tag passed to the engine's queries
    const KIND: NativeKind;
    /// Human-readable kind name used in errors
    const NAME: &'static str;
}

/// Declare a handle kind marker type.
///
/// ```ignore
/// define_handle_kind!(pub Texture = 7, "texture");
/// type TextureHandle = NativeHandle<Texture>;
/// ```
#[macro_export]
macro_rules! define_handle_kind {
    ($(#[$meta:meta])* $vis:vis $name:ident = $tag:expr, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {}

        impl $crate::ffi::HandleKind for $name {
            const KIND: $crate::ffi::NativeKind = $crate::ffi::NativeKind($tag);
            const NAME: &'static str = $label;
        }
    };
}

define_handle_kind!(
    /// Generic engine object
    pub Object = 0,
    "object"
);

/// Handle to a generic engine object
pub type ObjectHandle = NativeHandle<Object>;

/// Where a handle sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Null address
    Uninitialized,
    /// Non-null and reported live
    Created,
    /// Non-null but no longer live
    Stale,
}

impl HandleState {
    /// Lowercase name used in errors and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleState::Uninitialized => "uninitialized",
            HandleState::Created => "created",
            HandleState::Stale => "stale",
        }
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validity-checked wrapper around an engine object address.
///
/// Equality holds only while both sides are live and wrap the same address;
/// a stale handle is not even equal to itself. That is why the type has no
/// `Eq` impl. `Hash` uses the address alone so it never fails.
pub struct NativeHandle<K: HandleKind> {
    raw: RawPtr,
    surface: Arc<dyn EngineSurface>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: HandleKind> NativeHandle<K> {
    /// Wrap an address returned by the engine
    pub fn new(raw: RawPtr, surface: Arc<dyn EngineSurface>) -> Self {
        Self {
            raw,
            surface,
            _kind: PhantomData,
        }
    }

    /// A handle that refers to nothing
    pub fn null(surface: Arc<dyn EngineSurface>) -> Self {
        Self::new(RawPtr::NULL, surface)
    }

    /// The wrapped address, whether or not it is still live
    pub fn raw(&self) -> RawPtr {
        self.raw
    }

    /// Check if the handle wraps the null address
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    /// Non-null and reported live by the engine right now
    pub fn is_created(&self) -> bool {
        !self.raw.is_null() && self.surface.is_alive(K::KIND, self.raw)
    }

    /// Current lifecycle state, queried fresh
    pub fn state(&self) -> HandleState {
        if self.raw.is_null() {
            HandleState::Uninitialized
        } else if self.surface.is_alive(K::KIND, self.raw) {
            HandleState::Created
        } else {
            HandleState::Stale
        }
    }

    /// Fail with an invalid-state error unless the object is live
    pub fn ensure_created(&self) -> FfiResult<()> {
        match self.state() {
            HandleState::Created => Ok(()),
            state => {
                if state == HandleState::Stale {
                    tracing::warn!(
                        kind = K::NAME,
                        raw = self.raw.addr(),
                        "accessor called on stale handle"
                    );
                }
                Err(FfiError::InvalidState {
                    kind: K::NAME,
                    raw: self.raw.addr(),
                    state: state.as_str(),
                })
            }
        }
    }

    /// Engine-assigned identifier
    pub fn id(&self) -> FfiResult<i64> {
        self.ensure_created()?;
        Ok(self.surface.object_id(K::KIND, self.raw))
    }

    /// Object name, read through the context's staging buffer
    pub fn name(&self, ctx: &mut InteropContext) -> FfiResult<String> {
        self.ensure_created()?;
        Ok(ctx.fill_text(|out| self.surface.object_name(K::KIND, self.raw, out)))
    }

    /// Both handles live and wrapping the same address
    pub fn same_object(&self, other: &Self) -> bool {
        self.is_created() && other.is_created() && self.raw == other.raw
    }
}

impl<K: HandleKind> Clone for NativeHandle<K> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw,
            surface: Arc::clone(&self.surface),
            _kind: PhantomData,
        }
    }
}

impl<K: HandleKind> PartialEq for NativeHandle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.same_object(other)
    }
}

impl<K: HandleKind> Hash for NativeHandle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K: HandleKind> fmt::Debug for NativeHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // No native query here: formatting must not touch the engine
        f.debug_struct("NativeHandle")
            .field("kind", &K::NAME)
            .field("raw", &self.raw)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashMap;

    define_handle_kind!(Texture = 7, "texture");

    /// In-memory stand-in for the engine's object table
    #[derive(Default)]
    struct FakeEngine {
        objects: Mutex<HashMap<usize, (NativeKind, i64, String)>>,
    }

    impl FakeEngine {
        fn spawn(&self, addr: usize, kind: NativeKind, id: i64, name: &str) -> RawPtr {
            self.objects
                .lock()
                .insert(addr, (kind, id, name.to_string()));
            RawPtr::new(addr)
        }

        fn destroy(&self, raw: RawPtr) {
            self.objects.lock().remove(&raw.addr());
        }
    }

    impl EngineSurface for FakeEngine {
        fn is_alive(&self, kind: NativeKind, raw: RawPtr) -> bool {
            matches!(self.objects.lock().get(&raw.addr()), Some((k, _, _)) if *k == kind)
        }

        fn object_id(&self, _kind: NativeKind, raw: RawPtr) -> i64 {
            self.objects.lock()[&raw.addr()].1
        }

        fn object_name(&self, _kind: NativeKind, raw: RawPtr, out: &mut [u8]) {
            let objects = self.objects.lock();
            let name = objects[&raw.addr()].2.as_bytes();
            let n = name.len().min(out.len());
            out[..n].copy_from_slice(&name[..n]);
        }
    }

    fn setup() -> (Arc<FakeEngine>, Arc<dyn EngineSurface>) {
        let engine = Arc::new(FakeEngine::default());
        let surface: Arc<dyn EngineSurface> = engine.clone();
        (engine, surface)
    }

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_state_names() {
        assert_eq!(HandleState::Uninitialized.as_str(), "uninitialized");
        assert_eq!(HandleState::Created.as_str(), "created");
        assert_eq!(HandleState::Stale.to_string(), "stale");
    }

    #[test]
    fn test_null_handle_is_uninitialized() {
        let (_engine, surface) = setup();
        let handle = ObjectHandle::null(surface);

        assert!(handle.is_null());
        assert!(!handle.is_created());
        assert_eq!(handle.state(), HandleState::Uninitialized);
        assert_eq!(
            handle.id().unwrap_err(),
            FfiError::InvalidState {
                kind: "object",
                raw: 0,
                state: "uninitialized"
            }
        );
    }

    #[test]
    fn test_lifecycle_created_then_stale() {
        let (engine, surface) = setup();
        let raw = engine.spawn(0x1000, NativeKind::OBJECT, 17, "Player");
        let handle = ObjectHandle::new(raw, surface);
        let mut ctx = InteropContext::new();

        assert!(handle.is_created());
        assert_eq!(handle.id().unwrap(), 17);
        assert_eq!(handle.name(&mut ctx).unwrap(), "Player");

        engine.destroy(raw);

        assert!(!handle.is_created());
        assert_eq!(handle.state(), HandleState::Stale);
        assert_eq!(handle.raw(), raw);
        assert!(matches!(
            handle.id(),
            Err(FfiError::InvalidState { state: "stale", .. })
        ));
        assert!(matches!(
            handle.name(&mut ctx),
            Err(FfiError::InvalidState { state: "stale", .. })
        ));
    }

    #[test]
    fn test_equality_requires_liveness() {
        let (engine, surface) = setup();
        let raw = engine.spawn(0x2000, NativeKind::OBJECT, 1, "Camera");

        let a = ObjectHandle::new(raw, Arc::clone(&surface));
        let b = ObjectHandle::new(raw, Arc::clone(&surface));
        assert_eq!(a, b);
        assert_eq!(a, a.clone());

        engine.destroy(raw);
        assert_ne!(a, b);
        // A stale handle is not equal to itself either
        assert!(a != a);
    }

    #[test]
    fn test_reused_address_is_not_resurrected_as_equal() {
        let (engine, surface) = setup();
        let raw = engine.spawn(0x3000, NativeKind::OBJECT, 1, "Old");
        let old = ObjectHandle::new(raw, Arc::clone(&surface));

        engine.destroy(raw);
        let stale_copy = old.clone();
        assert_ne!(old, stale_copy);

        // The allocator hands the same address to a new object
        engine.spawn(0x3000, NativeKind::OBJECT, 2, "New");
        let fresh = ObjectHandle::new(raw, surface);
        assert_eq!(fresh.id().unwrap(), 2);
    }

    #[test]
    fn test_different_addresses_not_equal() {
        let (engine, surface) = setup();
        let a = ObjectHandle::new(
            engine.spawn(0x10, NativeKind::OBJECT, 1, "a"),
            Arc::clone(&surface),
        );
        let b = ObjectHandle::new(engine.spawn(0x20, NativeKind::OBJECT, 2, "b"), surface);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_stable_across_destruction() {
        let (engine, surface) = setup();
        let raw = engine.spawn(0x4000, NativeKind::OBJECT, 1, "Light");
        let handle = ObjectHandle::new(raw, surface);

        let before = hash_of(&handle);
        engine.destroy(raw);
        assert_eq!(hash_of(&handle), before);
        assert_eq!(before, hash_of(&raw));
    }

    #[test]
    fn test_kind_is_checked() {
        let (engine, surface) = setup();
        let raw = engine.spawn(0x5000, NativeKind::OBJECT, 1, "Mesh");

        let as_object = ObjectHandle::new(raw, Arc::clone(&surface));
        let as_texture = NativeHandle::<Texture>::new(raw, surface);

        assert!(as_object.is_created());
        assert!(!as_texture.is_created());
        assert_eq!(
            as_texture.id().unwrap_err().to_string(),
            "Invalid state: texture handle 0x5000 is stale"
        );
    }

    #[test]
    fn test_debug_does_not_query_engine() {
        let (_engine, surface) = setup();
        let handle = ObjectHandle::new(RawPtr::new(0xbeef), surface);
        let text = format!("{:?}", handle);
        assert!(text.contains("object"));
        assert!(text.contains("0xbeef"));
    }
}
