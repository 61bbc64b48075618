//! Raw Duktape C ABI declarations
//!
//! Type aliases follow `duktape.h` for a typical 32/64-bit platform build
//! (`duk_int_t` = `int`, `duk_small_uint_t` = `unsigned int`). Only the
//! subset the marshaling layer needs is declared.

#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_int, c_uint, c_void};

/// Opaque heap/thread handle
pub type duk_context = c_void;

pub type duk_size_t = usize;
pub type duk_int_t = c_int;
pub type duk_uint_t = c_uint;
pub type duk_small_int_t = c_int;
pub type duk_small_uint_t = c_uint;
pub type duk_bool_t = duk_small_uint_t;
pub type duk_idx_t = duk_int_t;
pub type duk_uarridx_t = duk_uint_t;
pub type duk_ret_t = duk_small_int_t;
pub type duk_double_t = f64;

/// Native function callable from script
pub type duk_c_function = unsafe extern "C" fn(ctx: *mut duk_context) -> duk_ret_t;

/// Body of a `duk_safe_call`; runs under a catchpoint, must not unwind
pub type duk_safe_call_function =
    unsafe extern "C" fn(ctx: *mut duk_context, udata: *mut c_void) -> duk_ret_t;

/// Heap-wide fatal error handler, must not return
pub type duk_fatal_function = unsafe extern "C" fn(udata: *mut c_void, msg: *const c_char);

pub type duk_alloc_function = unsafe extern "C" fn(udata: *mut c_void, size: duk_size_t) -> *mut c_void;
pub type duk_realloc_function =
    unsafe extern "C" fn(udata: *mut c_void, ptr: *mut c_void, size: duk_size_t) -> *mut c_void;
pub type duk_free_function = unsafe extern "C" fn(udata: *mut c_void, ptr: *mut c_void);

// Error codes
pub const DUK_ERR_NONE: duk_int_t = 0;
pub const DUK_ERR_ERROR: duk_int_t = 1;

/// Return value of a native function signalling a thrown `Error`
pub const DUK_RET_ERROR: duk_ret_t = -DUK_ERR_ERROR;

pub const DUK_EXEC_SUCCESS: duk_int_t = 0;
pub const DUK_EXEC_ERROR: duk_int_t = 1;

/// Native function takes a variable number of arguments
pub const DUK_VARARGS: duk_int_t = -1;

// Enumeration flags
pub const DUK_ENUM_INCLUDE_NONENUMERABLE: duk_uint_t = 1 << 0;
pub const DUK_ENUM_INCLUDE_HIDDEN: duk_uint_t = 1 << 1;
pub const DUK_ENUM_INCLUDE_SYMBOLS: duk_uint_t = 1 << 2;
pub const DUK_ENUM_EXCLUDE_STRINGS: duk_uint_t = 1 << 3;
pub const DUK_ENUM_OWN_PROPERTIES_ONLY: duk_uint_t = 1 << 4;
pub const DUK_ENUM_ARRAY_INDICES_ONLY: duk_uint_t = 1 << 5;
pub const DUK_ENUM_SORT_ARRAY_INDICES: duk_uint_t = 1 << 6;
pub const DUK_ENUM_NO_PROXY_BEHAVIOR: duk_uint_t = 1 << 7;

// Compile flags
pub const DUK_COMPILE_EVAL: duk_uint_t = 1 << 3;
pub const DUK_COMPILE_FUNCTION: duk_uint_t = 1 << 4;
pub const DUK_COMPILE_STRICT: duk_uint_t = 1 << 5;
pub const DUK_COMPILE_SHEBANG: duk_uint_t = 1 << 6;
pub const DUK_COMPILE_SAFE: duk_uint_t = 1 << 7;
pub const DUK_COMPILE_NORESULT: duk_uint_t = 1 << 8;
pub const DUK_COMPILE_NOSOURCE: duk_uint_t = 1 << 9;
pub const DUK_COMPILE_STRLEN: duk_uint_t = 1 << 10;
pub const DUK_COMPILE_NOFILENAME: duk_uint_t = 1 << 11;
pub const DUK_COMPILE_FUNCEXPR: duk_uint_t = 1 << 12;

/// Flags behind `duk_peval_lstring`: evaluate as expression, catch errors,
/// keep no source or filename
pub const DUK_PEVAL_FLAGS: duk_uint_t =
    DUK_COMPILE_EVAL | DUK_COMPILE_SAFE | DUK_COMPILE_NOSOURCE | DUK_COMPILE_NOFILENAME;

// Type masks
pub const DUK_TYPE_MASK_NONE: duk_uint_t = 1 << 0;
pub const DUK_TYPE_MASK_UNDEFINED: duk_uint_t = 1 << 1;
pub const DUK_TYPE_MASK_NULL: duk_uint_t = 1 << 2;
pub const DUK_TYPE_MASK_BOOLEAN: duk_uint_t = 1 << 3;
pub const DUK_TYPE_MASK_NUMBER: duk_uint_t = 1 << 4;
pub const DUK_TYPE_MASK_STRING: duk_uint_t = 1 << 5;
pub const DUK_TYPE_MASK_OBJECT: duk_uint_t = 1 << 6;
pub const DUK_TYPE_MASK_BUFFER: duk_uint_t = 1 << 7;
pub const DUK_TYPE_MASK_POINTER: duk_uint_t = 1 << 8;
pub const DUK_TYPE_MASK_LIGHTFUNC: duk_uint_t = 1 << 9;
