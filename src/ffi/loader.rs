//! Engine Library Loader
//!
//! Safe wrapper around libloading for binding the engine's C surface.

use std::collections::HashMap;
use std::ffi::CString;
use std::fmt;
use std::path::{Path, PathBuf};

use libc::c_char;
use libloading::{Library, Symbol};
use parking_lot::Mutex;

use super::error::{FfiError, FfiResult};
use super::surface::EngineSurface;
use super::types::{IsAliveFn, NativeKind, ObjectIdFn, ObjectNameFn, RawPtr};
use crate::config::{InteropConfig, SymbolConfig};

/// Function table for the engine's liveness and accessor queries
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EngineVTable {
    pub is_alive: IsAliveFn,
    pub object_id: ObjectIdFn,
    pub object_name: ObjectNameFn,
}

/// The native engine runtime, bound either from a shared library or from an
/// in-process function table
pub struct NativeEngine {
    /// Path to the library, if loaded from one
    path: Option<PathBuf>,
    /// Resolved query functions
    vtable: EngineVTable,
    /// Cached symbol addresses for extra entry points
    symbols: Mutex<HashMap<String, usize>>,
    /// Keeps every resolved function valid; must outlive `vtable`
    library: Option<Library>,
}

impl NativeEngine {
    /// Load the engine library and resolve its query symbols
    pub fn load(path: impl AsRef<Path>, names: &SymbolConfig) -> FfiResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Safety: loading runs the library's initializers. The caller vouches
        // for the library at this path.
        let library = unsafe {
            Library::new(&path).map_err(|e| {
                FfiError::LoadError(format!(
                    "Failed to load library '{}': {}",
                    path.display(),
                    e
                ))
            })?
        };

        // Safety: the configured symbols follow the documented C signatures
        let vtable = unsafe {
            EngineVTable {
                is_alive: resolve(&library, &path, &names.is_alive)?,
                object_id: resolve(&library, &path, &names.object_id)?,
                object_name: resolve(&library, &path, &names.object_name)?,
            }
        };

        tracing::debug!(path = %path.display(), "loaded engine library");
        Ok(Self {
            path: Some(path),
            vtable,
            symbols: Mutex::new(HashMap::new()),
            library: Some(library),
        })
    }

    /// Load the library named by configuration
    pub fn from_config(config: &InteropConfig) -> FfiResult<Self> {
        let path = config
            .engine
            .library
            .as_ref()
            .ok_or_else(|| FfiError::LoadError("No engine library configured".to_string()))?;
        Self::load(path, &config.symbols)
    }

    /// Bind functions already linked into the process
    pub fn from_vtable(vtable: EngineVTable) -> Self {
        Self {
            path: None,
            vtable,
            symbols: Mutex::new(HashMap::new()),
            library: None,
        }
    }

    /// Get the path to the library
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get the query function table
    pub fn vtable(&self) -> &EngineVTable {
        &self.vtable
    }

    /// Get the address of an extra entry point by name
    pub fn symbol_addr(&self, name: &str) -> FfiResult<usize> {
        // Check cache first
        if let Some(&addr) = self.symbols.lock().get(name) {
            return Ok(addr);
        }

        let library = self.library.as_ref().ok_or_else(|| {
            FfiError::SymbolNotFound(format!("'{}': engine was not loaded from a library", name))
        })?;
        let path = self.path.as_deref().unwrap_or_else(|| Path::new("<process>"));

        // Safety: only the address is read; nothing is called through it here
        let symbol: *const () = unsafe { resolve(library, path, name)? };
        let addr = symbol as usize;
        self.symbols.lock().insert(name.to_string(), addr);
        Ok(addr)
    }

    /// Resolve an extra entry point as a typed function pointer.
    ///
    /// # Safety
    ///
    /// `T` must be the function pointer type matching the symbol's actual
    /// signature and calling convention.
    pub unsafe fn function<T: Copy>(&self, name: &str) -> FfiResult<T> {
        let library = self.library.as_ref().ok_or_else(|| {
            FfiError::SymbolNotFound(format!("'{}': engine was not loaded from a library", name))
        })?;
        let path = self.path.as_deref().unwrap_or_else(|| Path::new("<process>"));
        resolve(library, path, name)
    }
}

impl EngineSurface for NativeEngine {
    fn is_alive(&self, kind: NativeKind, raw: RawPtr) -> bool {
        unsafe { (self.vtable.is_alive)(kind.0, raw.as_ptr()) }
    }

    fn object_id(&self, kind: NativeKind, raw: RawPtr) -> i64 {
        unsafe { (self.vtable.object_id)(kind.0, raw.as_ptr()) }
    }

    fn object_name(&self, kind: NativeKind, raw: RawPtr, out: &mut [u8]) {
        unsafe {
            (self.vtable.object_name)(
                kind.0,
                raw.as_ptr(),
                out.as_mut_ptr() as *mut c_char,
                out.len(),
            )
        }
    }
}

impl fmt::Debug for NativeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEngine")
            .field("path", &self.path)
            .field("vtable", &self.vtable)
            .field("cached_symbols", &self.symbols.lock().len())
            .finish()
    }
}

/// Resolve `name` in `library` as a `T`.
///
/// # Safety
///
/// `T` must match the symbol's real type.
unsafe fn resolve<T: Copy>(library: &Library, path: &Path, name: &str) -> FfiResult<T> {
    let c_name = CString::new(name)
        .map_err(|_| FfiError::InvalidSymbol(format!("Invalid symbol name: {}", name)))?;

    let symbol: Symbol<T> = library.get(c_name.as_bytes_with_nul()).map_err(|e| {
        FfiError::SymbolNotFound(format!(
            "Symbol '{}' not found in '{}': {}",
            name,
            path.display(),
            e
        ))
    })?;
    Ok(*symbol)
}
