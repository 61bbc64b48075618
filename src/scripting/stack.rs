//! 栈帧守卫
//!
//! 进入时记录引擎栈深度，离开作用域时无条件恢复，
//! 覆盖成功、脚本错误和转换错误所有返回路径。

use super::interpreter::Heap;
use crate::bindings::ffi::duk_idx_t;

pub(crate) struct StackFrame<'a> {
    heap: &'a Heap,
    top: duk_idx_t,
}

impl<'a> StackFrame<'a> {
    pub(crate) fn enter(heap: &'a Heap) -> Self {
        let top = unsafe { (heap.lib().duk_get_top)(heap.ctx()) };
        Self { heap, top }
    }

    /// 进入时的栈深度，也是此帧内第一个新压入值的索引
    pub(crate) fn top(&self) -> duk_idx_t {
        self.top
    }
}

impl Drop for StackFrame<'_> {
    fn drop(&mut self) {
        unsafe { (self.heap.lib().duk_set_top)(self.heap.ctx(), self.top) };
    }
}
