//! 原生回调
//!
//! 引擎的原生函数调用约定不携带用户数据，所以所有宿主函数共用一个
//! `extern "C"` 跳板：宿主函数地址保存在函数对象的隐藏属性上，
//! 解释器通过线程局部表按上下文指针查找。

use super::data::{Data, Function};
use super::interpreter::Heap;
use super::stack::StackFrame;
use crate::bindings::ffi::*;
use crate::core::{DukError, DukResult};
use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::{Rc, Weak};

/// 宿主函数指针所在的隐藏属性，`\xFF` 前缀对脚本不可见
pub(crate) const HOST_FUNCTION_KEY: &[u8] = b"\xffhost_function";

/// 交给引擎的回调，随堆一起存活
pub(crate) enum Pinned {
    Fatal(Box<FatalHandler>),
    Function(Box<Function>),
}

impl Pinned {
    /// 交给引擎的地址
    pub(crate) fn address(&self) -> *const c_void {
        match self {
            Pinned::Fatal(handler) => (&**handler as *const FatalHandler).cast(),
            Pinned::Function(function) => (&**function as *const Function).cast(),
        }
    }
}

pub(crate) type FatalSink = Box<dyn Fn(&str)>;

/// 致命错误处理器，地址作为堆的 udata
pub(crate) struct FatalHandler {
    sink: FatalSink,
}

impl FatalHandler {
    pub(crate) fn new(sink: FatalSink) -> Self {
        Self { sink }
    }

    pub(crate) fn udata(&self) -> *mut c_void {
        (self as *const Self).cast_mut().cast()
    }

    fn report(&self, msg: &str) {
        (self.sink)(msg)
    }
}

pub(crate) fn default_fatal_sink() -> FatalSink {
    Box::new(|msg: &str| {
        tracing::error!(target: "duktape", "Fatal engine error: {}", msg);
        eprintln!("duktape fatal error: {}", msg);
    })
}

/// 引擎不可恢复时调用，输出诊断后结束进程
pub(crate) unsafe extern "C" fn fatal_trampoline(udata: *mut c_void, msg: *const c_char) {
    let text = if msg.is_null() {
        Cow::Borrowed("unknown fatal error")
    } else {
        CStr::from_ptr(msg).to_string_lossy()
    };

    if !udata.is_null() {
        let handler = &*udata.cast::<FatalHandler>().cast_const();
        let _ = panic::catch_unwind(AssertUnwindSafe(|| handler.report(&text)));
    }
    std::process::exit(1);
}

thread_local! {
    static LIVE_HEAPS: RefCell<HashMap<usize, Weak<Heap>>> = RefCell::new(HashMap::new());
}

pub(crate) fn register_heap(heap: &Rc<Heap>) {
    LIVE_HEAPS.with(|heaps| {
        heaps
            .borrow_mut()
            .insert(heap.ctx() as usize, Rc::downgrade(heap))
    });
}

pub(crate) fn unregister_heap(ctx: *mut duk_context) {
    // 线程退出时表可能已经析构
    let _ = LIVE_HEAPS.try_with(|heaps| heaps.borrow_mut().remove(&(ctx as usize)));
}

fn live_heap(ctx: *mut duk_context) -> Option<Rc<Heap>> {
    LIVE_HEAPS
        .try_with(|heaps| heaps.borrow().get(&(ctx as usize)).and_then(Weak::upgrade))
        .ok()
        .flatten()
}

/// 读取 `idx` 处函数对象携带的宿主函数
///
/// 只认跳板本身：隐藏属性可以沿原型链继承，
/// 以宿主函数为原型的脚本函数不能冒充宿主函数。
pub(crate) fn host_function_at(heap: &Heap, idx: duk_idx_t) -> DukResult<Option<Function>> {
    let api = heap.lib();
    let ctx = heap.ctx();

    let native = unsafe { (api.duk_get_c_function)(ctx, idx) };
    if native.map(|f| f as usize) != Some(host_function_trampoline as usize) {
        return Ok(None);
    }

    let _frame = StackFrame::enter(heap);
    heap.get_prop(idx, HOST_FUNCTION_KEY)?;
    let ptr = unsafe { (api.duk_get_pointer)(ctx, -1) };
    if ptr.is_null() {
        return Ok(None);
    }
    Ok(heap.pinned_function(ptr.cast_const()))
}

/// 正在执行的原生函数对应的宿主函数
fn current_host_function(heap: &Heap) -> DukResult<Option<Function>> {
    heap.reserve(1)?;
    let frame = StackFrame::enter(heap);
    unsafe { (heap.lib().duk_push_current_function)(heap.ctx()) };
    host_function_at(heap, frame.top())
}

/// 把宿主函数包装成原生函数压入栈顶
///
/// 宿主函数先进入固定表，再注册到引擎。
pub(crate) fn push_host_function(heap: &Heap, function: Function) -> DukResult<()> {
    heap.reserve(2)?;
    let api = heap.lib();
    let ctx = heap.ctx();

    let boxed = Box::new(function);
    let ptr = (&*boxed as *const Function).cast_mut().cast::<c_void>();
    heap.pin(Pinned::Function(boxed));

    let func_idx = unsafe {
        let func_idx = (api.duk_push_c_function)(ctx, host_function_trampoline, DUK_VARARGS);
        (api.duk_push_pointer)(ctx, ptr);
        func_idx
    };
    heap.put_prop(func_idx, HOST_FUNCTION_KEY).map_err(|e| {
        unsafe { (api.duk_set_top)(ctx, func_idx) };
        e
    })
}

/// 所有宿主函数共用的原生函数
///
/// 进入引擎的外层调用（借用中的 `Interpreter` 或正在执行的脚本函数）
/// 总是另持有堆的强引用，这里的引用不会是最后一个，堆不会在回调内析构。
unsafe extern "C" fn host_function_trampoline(ctx: *mut duk_context) -> duk_ret_t {
    let Some(heap) = live_heap(ctx) else {
        tracing::error!(target: "duktape", "Native call on unknown heap {:p}", ctx);
        return DUK_RET_ERROR;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| call_host_function(&heap))) {
        Ok(Ok(())) => 1,
        Ok(Err(e)) => {
            tracing::debug!(target: "duktape", "Host function failed: {}", e);
            DUK_RET_ERROR
        }
        Err(payload) => {
            tracing::error!(
                target: "duktape",
                "Host function panicked: {}",
                panic_message(payload.as_ref())
            );
            DUK_RET_ERROR
        }
    }
}

/// 参数从左到右读取，返回值留在栈顶
fn call_host_function(heap: &Rc<Heap>) -> DukResult<()> {
    let function = current_host_function(heap)?
        .ok_or_else(|| DukError::callback("native function has no host callable"))?;

    let argc = unsafe { (heap.lib().duk_get_top)(heap.ctx()) };
    let args = (0..argc)
        .map(|idx| heap.peek(idx))
        .collect::<DukResult<Vec<Data>>>()?;

    let result = function.call(&args)?;
    heap.push(&result)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

fn stash_key(ptr: *mut c_void) -> String {
    format!("{:x}", ptr as usize)
}

/// 把堆对象挂到 stash 上，防止被回收
///
/// 条目从不删除，随堆一起释放。
pub(crate) fn stash(heap: &Heap, ptr: *mut c_void) -> DukResult<()> {
    heap.reserve(2)?;
    let frame = StackFrame::enter(heap);
    let api = heap.lib();
    let ctx = heap.ctx();

    unsafe {
        (api.duk_push_heap_stash)(ctx);
        (api.duk_push_heapptr)(ctx, ptr);
    }
    heap.put_prop(frame.top(), stash_key(ptr).as_bytes())
}

/// 脚本侧函数的宿主包装
///
/// 只持有堆的弱引用，解释器销毁后调用返回 `DukError::Destroyed`。
pub(crate) struct ScriptFunction {
    heap: Weak<Heap>,
    ptr: *mut c_void,
}

impl ScriptFunction {
    pub(crate) fn new(heap: &Rc<Heap>, ptr: *mut c_void) -> Self {
        Self {
            heap: Rc::downgrade(heap),
            ptr,
        }
    }

    pub(crate) fn heap_ptr(&self) -> *mut c_void {
        self.ptr
    }

    pub(crate) fn belongs_to(&self, heap: &Heap) -> bool {
        ptr::eq(self.heap.as_ptr(), heap)
    }

    pub(crate) fn same_object(&self, other: &ScriptFunction) -> bool {
        Weak::ptr_eq(&self.heap, &other.heap) && self.ptr == other.ptr
    }

    /// 受保护调用，脚本异常转换为 `DukError::Evaluation`
    pub(crate) fn call(&self, args: &[Data]) -> DukResult<Data> {
        let heap = self.heap.upgrade().ok_or(DukError::Destroyed)?;
        let nargs = duk_idx_t::try_from(args.len())
            .map_err(|_| DukError::UnsupportedValue(format!("too many arguments: {}", args.len())))?;
        heap.reserve(nargs.saturating_add(1))?;

        let _frame = StackFrame::enter(&heap);
        let api = heap.lib();
        let ctx = heap.ctx();

        unsafe { (api.duk_push_heapptr)(ctx, self.ptr) };
        for arg in args {
            heap.push(arg)?;
        }

        if unsafe { (api.duk_pcall)(ctx, nargs) } != DUK_EXEC_SUCCESS {
            let err = heap.error_at(-1);
            tracing::debug!(target: "duktape", "Script function failed: {}", err);
            return Err(err);
        }
        heap.peek(-1)
    }
}
