//! Engine Binding Layer (FFI)
//!
//! Typed mapping of the Duktape C API subset used by the interpreter.
//! No behavior lives here beyond locating symbols and fixing the calling
//! convention of each entry point.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │     scripting::Interpreter    │   push / peek / eval / get / set
//! └──────────────┬───────────────┘
//!                │  (lib.duk_*)(ctx, ...)
//!                v
//! ┌──────────────────────────────┐
//! │   bindings::Lib (DukApi)      │   function-pointer table
//! └──────────────┬───────────────┘
//!                │  libloading
//!                v
//! ┌──────────────────────────────┐
//! │   libduktape.so / .dylib / .dll│
//! └──────────────────────────────┘
//! ```

pub mod ffi;
pub mod library;

pub use library::{DukApi, Lib};
