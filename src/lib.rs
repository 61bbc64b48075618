//! # Duktape Bridge
//!
//! Bidirectional value marshaling between Rust and the Duktape JavaScript
//! engine, loaded at runtime as a shared library.
//!
//! ## Features
//!
//! - **Dynamic binding**: the engine's C API is resolved with `libloading`,
//!   nothing is linked at build time
//! - **Data marshaling**: `Data` values cross the boundary in both directions,
//!   including nested arrays and objects
//! - **Function bridging**: Rust closures become callable script functions,
//!   script functions become callable Rust values
//! - **Stack discipline**: every operation leaves the engine value stack at
//!   the depth it found it, on success and on error
//!
//! ### Example
//!
//! ```no_run
//! use duktape_bridge::{Data, Interpreter};
//!
//! # fn main() -> duktape_bridge::DukResult<()> {
//! let interp = Interpreter::new()?;
//! interp.set("add", Data::function(|args| {
//!     let sum = args.iter().filter_map(Data::as_f64).sum::<f64>();
//!     Ok(Data::Number(sum))
//! }))?;
//! assert_eq!(interp.eval("add(2, 3)")?, Data::Number(5.0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`bindings`]: Duktape C ABI declarations and the loaded library
//! - [`scripting`]: interpreter, value types and marshaling
//! - [`config`]: library location and logging configuration
//! - [`core`]: error types and shared macros

/// Error types and shared macros
pub mod core;
/// Duktape C ABI and dynamic library binding
pub mod bindings;
/// Interpreter and host/script value marshaling
pub mod scripting;
/// Configuration system
pub mod config;

pub use bindings::{DukApi, Lib};
pub use config::{init_logging, BridgeConfig};
pub use crate::core::{DukError, DukResult};
pub use scripting::{Callable, Data, Function, Interpreter, InterpreterBuilder};
