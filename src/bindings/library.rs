//! Duktape library binding
//!
//! `DukApi` is the typed function-pointer table for the C entry points the
//! marshaling layer uses; `Lib` owns the shared library those pointers were
//! resolved from, so the table can never outlive its code.

use super::ffi::*;
use crate::config::{BridgeConfig, LibraryConfig};
use crate::core::{DukError, DukResult};
use libloading::Library;
use std::fmt;
use std::ops::Deref;
use std::os::raw::{c_char, c_void};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Typed Duktape entry points
///
/// Field names match the exported C symbols, so resolution is by name.
#[derive(Clone, Copy)]
pub struct DukApi {
    // Heap lifecycle
    pub duk_create_heap: unsafe extern "C" fn(
        Option<duk_alloc_function>,
        Option<duk_realloc_function>,
        Option<duk_free_function>,
        *mut c_void,
        Option<duk_fatal_function>,
    ) -> *mut duk_context,
    pub duk_destroy_heap: unsafe extern "C" fn(*mut duk_context),

    // Stack inspection
    pub duk_get_top: unsafe extern "C" fn(*mut duk_context) -> duk_idx_t,
    pub duk_set_top: unsafe extern "C" fn(*mut duk_context, duk_idx_t),
    pub duk_check_stack: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> duk_bool_t,
    pub duk_dup: unsafe extern "C" fn(*mut duk_context, duk_idx_t),

    // Type tests
    pub duk_get_type_mask: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> duk_uint_t,
    pub duk_is_boolean: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> duk_bool_t,
    pub duk_is_number: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> duk_bool_t,
    pub duk_is_string: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> duk_bool_t,
    pub duk_is_array: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> duk_bool_t,
    pub duk_is_function: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> duk_bool_t,
    pub duk_is_object: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> duk_bool_t,

    // Value extraction
    pub duk_get_boolean: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> duk_bool_t,
    pub duk_get_number: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> duk_double_t,
    pub duk_get_lstring:
        unsafe extern "C" fn(*mut duk_context, duk_idx_t, *mut duk_size_t) -> *const c_char,
    pub duk_get_heapptr: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> *mut c_void,
    pub duk_get_pointer: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> *mut c_void,
    pub duk_get_c_function:
        unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> Option<duk_c_function>,

    // Value construction
    pub duk_push_null: unsafe extern "C" fn(*mut duk_context),
    pub duk_push_boolean: unsafe extern "C" fn(*mut duk_context, duk_bool_t),
    pub duk_push_number: unsafe extern "C" fn(*mut duk_context, duk_double_t),
    pub duk_push_lstring:
        unsafe extern "C" fn(*mut duk_context, *const c_char, duk_size_t) -> *const c_char,
    pub duk_push_array: unsafe extern "C" fn(*mut duk_context) -> duk_idx_t,
    pub duk_push_object: unsafe extern "C" fn(*mut duk_context) -> duk_idx_t,
    pub duk_push_heapptr: unsafe extern "C" fn(*mut duk_context, *mut c_void) -> duk_idx_t,
    pub duk_push_pointer: unsafe extern "C" fn(*mut duk_context, *mut c_void),
    pub duk_push_heap_stash: unsafe extern "C" fn(*mut duk_context),

    // Property access
    pub duk_put_prop_index:
        unsafe extern "C" fn(*mut duk_context, duk_idx_t, duk_uarridx_t) -> duk_bool_t,
    pub duk_put_prop_lstring:
        unsafe extern "C" fn(*mut duk_context, duk_idx_t, *const c_char, duk_size_t) -> duk_bool_t,
    pub duk_get_prop_lstring:
        unsafe extern "C" fn(*mut duk_context, duk_idx_t, *const c_char, duk_size_t) -> duk_bool_t,
    pub duk_get_global_lstring:
        unsafe extern "C" fn(*mut duk_context, *const c_char, duk_size_t) -> duk_bool_t,
    pub duk_put_global_lstring:
        unsafe extern "C" fn(*mut duk_context, *const c_char, duk_size_t) -> duk_bool_t,
    pub duk_enum: unsafe extern "C" fn(*mut duk_context, duk_idx_t, duk_uint_t),
    pub duk_next: unsafe extern "C" fn(*mut duk_context, duk_idx_t, duk_bool_t) -> duk_bool_t,

    // Evaluation and calls
    pub duk_eval_raw:
        unsafe extern "C" fn(*mut duk_context, *const c_char, duk_size_t, duk_uint_t) -> duk_int_t,
    pub duk_pcall: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> duk_int_t,
    pub duk_safe_call: unsafe extern "C" fn(
        *mut duk_context,
        duk_safe_call_function,
        *mut c_void,
        duk_idx_t,
        duk_idx_t,
    ) -> duk_int_t,
    pub duk_safe_to_stacktrace: unsafe extern "C" fn(*mut duk_context, duk_idx_t) -> *const c_char,

    // Function bridging
    pub duk_push_c_function:
        unsafe extern "C" fn(*mut duk_context, duk_c_function, duk_idx_t) -> duk_idx_t,
    pub duk_push_current_function: unsafe extern "C" fn(*mut duk_context),
}

impl DukApi {
    /// `duk_peval_lstring`: protected evaluation, result or error left on top
    ///
    /// # Safety
    /// `ctx` must be a live heap created through this table.
    pub unsafe fn duk_peval_lstring(&self, ctx: *mut duk_context, src: &[u8]) -> duk_int_t {
        (self.duk_eval_raw)(ctx, src.as_ptr().cast(), src.len(), DUK_PEVAL_FLAGS)
    }

    /// `duk_is_null_or_undefined`
    ///
    /// # Safety
    /// `ctx` must be a live heap created through this table.
    pub unsafe fn duk_is_null_or_undefined(&self, ctx: *mut duk_context, idx: duk_idx_t) -> bool {
        (self.duk_get_type_mask)(ctx, idx) & (DUK_TYPE_MASK_NULL | DUK_TYPE_MASK_UNDEFINED) != 0
    }
}

unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> DukResult<T> {
    library
        .get::<T>(name.as_bytes())
        .map(|sym| *sym)
        .map_err(|e| DukError::Symbol(format!("{}: {}", name, e)))
}

macro_rules! resolve_api {
    ($library:expr, { $($name:ident),* $(,)? }) => {
        DukApi {
            $($name: symbol($library, stringify!($name))?,)*
        }
    };
}

/// Loaded Duktape library
pub struct Lib {
    api: DukApi,
    path: Option<PathBuf>,
    // Keeps the code behind `api` mapped; dropped last.
    _library: Option<Library>,
}

static DEFAULT_LIB: OnceLock<Result<Arc<Lib>, String>> = OnceLock::new();

impl Lib {
    /// Load the shared library at `path` and resolve every entry point
    pub fn load(path: impl AsRef<Path>) -> DukResult<Self> {
        let path = path.as_ref();
        let library = unsafe { Library::new(path) }
            .map_err(|e| DukError::Load(format!("{}: {}", path.display(), e)))?;

        let api = unsafe {
            resolve_api!(&library, {
                duk_create_heap,
                duk_destroy_heap,
                duk_get_top,
                duk_set_top,
                duk_check_stack,
                duk_dup,
                duk_get_type_mask,
                duk_is_boolean,
                duk_is_number,
                duk_is_string,
                duk_is_array,
                duk_is_function,
                duk_is_object,
                duk_get_boolean,
                duk_get_number,
                duk_get_lstring,
                duk_get_heapptr,
                duk_get_pointer,
                duk_get_c_function,
                duk_push_null,
                duk_push_boolean,
                duk_push_number,
                duk_push_lstring,
                duk_push_array,
                duk_push_object,
                duk_push_heapptr,
                duk_push_pointer,
                duk_push_heap_stash,
                duk_put_prop_index,
                duk_put_prop_lstring,
                duk_get_prop_lstring,
                duk_get_global_lstring,
                duk_put_global_lstring,
                duk_enum,
                duk_next,
                duk_eval_raw,
                duk_pcall,
                duk_safe_call,
                duk_safe_to_stacktrace,
                duk_push_c_function,
                duk_push_current_function,
            })
        };

        tracing::debug!(target: "duktape", "Loaded duktape library from {}", path.display());
        Ok(Self {
            api,
            path: Some(path.to_path_buf()),
            _library: Some(library),
        })
    }

    /// Load the library described by `config`
    pub fn from_config(config: &LibraryConfig) -> DukResult<Self> {
        config.validate()?;
        Self::load(config.resolve_path())
    }

    /// Wrap an already resolved table, e.g. a statically linked or
    /// in-process engine.
    ///
    /// # Safety
    /// Every pointer in `api` must implement the documented Duktape
    /// contract and stay valid for the lifetime of the returned `Lib`.
    pub unsafe fn from_api(api: DukApi) -> Self {
        Self {
            api,
            path: None,
            _library: None,
        }
    }

    /// Process-wide default binding
    ///
    /// Resolved on first use from `BridgeConfig::load_or_default()`; the
    /// outcome, including a load failure, is cached for the process.
    pub fn default_lib() -> DukResult<Arc<Lib>> {
        DEFAULT_LIB
            .get_or_init(|| {
                let config = BridgeConfig::load_or_default();
                Lib::from_config(&config.library)
                    .map(Arc::new)
                    .map_err(|e| match e {
                        DukError::Load(msg) => msg,
                        other => other.to_string(),
                    })
            })
            .clone()
            .map_err(DukError::Load)
    }

    pub fn api(&self) -> &DukApi {
        &self.api
    }

    /// Path the library was loaded from, `None` for `from_api` bindings
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Deref for Lib {
    type Target = DukApi;

    fn deref(&self) -> &DukApi {
        &self.api
    }
}

impl fmt::Debug for Lib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lib").field("path", &self.path).finish()
    }
}
