//! JavaScript 解释器
//!
//! 每个 `Interpreter` 独占一个 Duktape 堆。状态流转：
//! 构造时创建堆并注册致命错误处理器（Ready），之后可反复调用
//! `eval` / `get` / `set`，销毁时先释放引擎堆，再释放固定回调表。
//!
//! 解释器不是 `Send`：一个堆只能在创建它的线程上使用，
//! 需要并发时每个线程各自创建解释器。

use super::callbacks::{self, FatalHandler, Pinned};
use super::data::{Data, Function};
use super::stack::StackFrame;
use crate::bindings::ffi::*;
use crate::bindings::{DukApi, Lib};
use crate::core::{DukError, DukResult};
use std::cell::RefCell;
use std::ffi::CStr;
use std::fmt;
use std::os::raw::c_void;
use std::path::Path;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;

/// 引擎堆及其附属状态
///
/// 由 `Interpreter` 唯一强引用持有；脚本函数包装器只持有弱引用。
pub(crate) struct Heap {
    ctx: NonNull<duk_context>,
    /// 交给引擎的原生回调，只追加，随堆一起释放
    pinned: RefCell<Vec<Pinned>>,
    lib: Arc<Lib>,
}

impl Heap {
    pub(crate) fn lib(&self) -> &DukApi {
        &self.lib
    }

    pub(crate) fn ctx(&self) -> *mut duk_context {
        self.ctx.as_ptr()
    }

    pub(crate) fn pin(&self, entry: Pinned) {
        self.pinned.borrow_mut().push(entry);
    }

    /// 按地址查找已固定的宿主函数
    pub(crate) fn pinned_function(&self, ptr: *const c_void) -> Option<Function> {
        self.pinned.borrow().iter().find_map(|entry| match entry {
            Pinned::Function(function) if entry.address() == ptr => Some((**function).clone()),
            _ => None,
        })
    }

    pub(crate) fn pinned_count(&self) -> usize {
        self.pinned.borrow().len()
    }

    pub(crate) fn stack_depth(&self) -> usize {
        let top = unsafe { (self.lib().duk_get_top)(self.ctx()) };
        usize::try_from(top).unwrap_or_default()
    }

    /// 确保还能再压入 `extra` 个值
    pub(crate) fn reserve(&self, extra: duk_idx_t) -> DukResult<()> {
        if unsafe { (self.lib().duk_check_stack)(self.ctx(), extra) } == 0 {
            return Err(DukError::UnsupportedValue(
                "value stack exhausted".to_string(),
            ));
        }
        Ok(())
    }

    /// `idx` 处错误值的诊断文本（优先取堆栈）
    pub(crate) fn error_text(&self, idx: duk_idx_t) -> String {
        let msg = unsafe { (self.lib().duk_safe_to_stacktrace)(self.ctx(), idx) };
        if msg.is_null() {
            "unknown error".to_string()
        } else {
            unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
        }
    }

    /// 把 `idx` 处的错误值转换为 `DukError::Evaluation`
    pub(crate) fn error_at(&self, idx: duk_idx_t) -> DukError {
        DukError::Evaluation(self.error_text(idx))
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        callbacks::unregister_heap(self.ctx());
        unsafe { (self.lib.duk_destroy_heap)(self.ctx()) };
        tracing::debug!(
            target: "duktape",
            "Destroyed duktape heap ({} pinned callbacks released)",
            self.pinned.borrow().len()
        );
    }
}

/// JavaScript 解释器
pub struct Interpreter {
    heap: Rc<Heap>,
}

impl Interpreter {
    /// 使用进程级默认动态库创建解释器
    pub fn new() -> DukResult<Self> {
        Self::builder().build()
    }

    /// 使用指定的动态库创建解释器
    pub fn with_lib(lib: Arc<Lib>) -> DukResult<Self> {
        Self::builder().lib(lib).build()
    }

    /// 加载指定路径的动态库并创建解释器
    pub fn from_path(path: impl AsRef<Path>) -> DukResult<Self> {
        Self::with_lib(Arc::new(Lib::load(path)?))
    }

    pub fn builder() -> InterpreterBuilder {
        InterpreterBuilder::default()
    }

    /// 当前使用的动态库
    pub fn lib(&self) -> &Arc<Lib> {
        &self.heap.lib
    }

    /// 执行代码，`with_result` 为真时返回最后一个表达式的值
    pub fn evaluate(&self, code: &str, with_result: bool) -> DukResult<Option<Data>> {
        let heap = &self.heap;
        let _frame = StackFrame::enter(heap);

        let rc = unsafe { heap.lib().duk_peval_lstring(heap.ctx(), code.as_bytes()) };
        if rc != DUK_EXEC_SUCCESS {
            let err = heap.error_at(-1);
            tracing::debug!(target: "duktape", "Evaluation failed: {}", err);
            return Err(err);
        }

        if with_result {
            heap.peek(-1).map(Some)
        } else {
            Ok(None)
        }
    }

    /// 执行代码并返回最后一个表达式的值
    pub fn eval(&self, code: &str) -> DukResult<Data> {
        self.evaluate(code, true).map(Option::unwrap_or_default)
    }

    /// 执行代码，丢弃结果
    pub fn exec(&self, code: &str) -> DukResult<()> {
        self.evaluate(code, false).map(|_| ())
    }

    /// 读取全局变量，不存在时返回 `Data::Null`
    pub fn get(&self, name: &str) -> DukResult<Data> {
        let heap = &self.heap;
        let _frame = StackFrame::enter(heap);

        heap.get_global(name)?;
        heap.peek(-1)
    }

    /// 写入全局变量
    pub fn set(&self, name: &str, value: impl Into<Data>) -> DukResult<()> {
        let value = value.into();
        let heap = &self.heap;
        let _frame = StackFrame::enter(heap);

        heap.push(&value)?;
        heap.put_global(name)
    }

    /// 调用全局函数
    pub fn call(&self, name: &str, args: &[Data]) -> DukResult<Data> {
        match self.get(name)? {
            Data::Function(function) => function.call(args),
            other => Err(DukError::UnsupportedValue(format!(
                "global '{}' is {}, not a function",
                name,
                other.type_name()
            ))),
        }
    }

    /// 当前引擎栈深度
    pub fn stack_depth(&self) -> usize {
        self.heap.stack_depth()
    }

    /// 已固定的原生回调数量（含致命错误处理器）
    pub fn pinned_count(&self) -> usize {
        self.heap.pinned_count()
    }

    /// 销毁解释器，释放引擎堆
    ///
    /// 之后仍存活的脚本函数调用会返回 `DukError::Destroyed`。
    pub fn destroy(self) {
        drop(self);
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("lib", &self.heap.lib)
            .field("stack_depth", &self.stack_depth())
            .field("pinned", &self.pinned_count())
            .finish()
    }
}

/// 解释器构建器
#[derive(Default)]
pub struct InterpreterBuilder {
    lib: Option<Arc<Lib>>,
    fatal_sink: Option<Box<dyn Fn(&str)>>,
}

impl InterpreterBuilder {
    /// 指定动态库，默认使用 `Lib::default_lib()`
    pub fn lib(mut self, lib: Arc<Lib>) -> Self {
        self.lib = Some(lib);
        self
    }

    /// 指定致命错误的诊断输出
    ///
    /// 输出完成后进程仍会以状态码 1 退出。
    pub fn fatal_handler<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str) + 'static,
    {
        self.fatal_sink = Some(Box::new(sink));
        self
    }

    pub fn build(self) -> DukResult<Interpreter> {
        let lib = match self.lib {
            Some(lib) => lib,
            None => Lib::default_lib()?,
        };
        let fatal = Box::new(FatalHandler::new(
            self.fatal_sink.unwrap_or_else(callbacks::default_fatal_sink),
        ));

        let ctx = unsafe {
            (lib.duk_create_heap)(
                None,
                None,
                None,
                fatal.udata(),
                Some(callbacks::fatal_trampoline),
            )
        };
        let ctx = NonNull::new(ctx).ok_or(DukError::HeapCreation)?;

        let heap = Rc::new(Heap {
            ctx,
            pinned: RefCell::new(vec![Pinned::Fatal(fatal)]),
            lib,
        });
        callbacks::register_heap(&heap);
        tracing::debug!(target: "duktape", "Created duktape heap {:p}", heap.ctx());

        Ok(Interpreter { heap })
    }
}
