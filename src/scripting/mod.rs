//! 脚本桥接
//!
//! 宿主值与 Duktape 值栈之间的双向编组：
//! - `data`: 唯一跨边界的值类型 `Data`
//! - `interpreter`: 解释器生命周期与 eval/get/set
//! - `marshal`: 递归 push/peek 协议
//! - `callbacks`: 原生回调跳板、脚本函数包装、stash
//! - `protect`: 可能抛出的引擎原语，经由保护调用执行
//! - `stack`: 栈深度守卫
//! - `text`: CESU-8 与 UTF-8 之间的转换

pub mod data;
pub mod interpreter;

mod callbacks;
mod marshal;
mod protect;
mod stack;
mod text;

pub use data::{Callable, Data, Function};
pub use interpreter::{Interpreter, InterpreterBuilder};
