//! 值编组
//!
//! `peek` 把引擎栈上的值递归转换为 `Data`，`push` 反之。
//! 两个方向都在每层递归前预留栈空间，并在出错时把栈恢复到进入时的深度。

use super::callbacks::{self, ScriptFunction};
use super::data::{Data, Function};
use super::interpreter::Heap;
use super::stack::StackFrame;
use super::text;
use crate::bindings::ffi::*;
use crate::core::{DukError, DukResult};
use std::collections::HashMap;
use std::rc::Rc;
use std::slice;

/// 最大嵌套深度，循环引用的脚本对象在这里终止
pub(crate) const MAX_DEPTH: usize = 1000;

fn too_deep() -> DukError {
    DukError::UnsupportedValue(format!("value nesting exceeds {} levels", MAX_DEPTH))
}

impl Heap {
    /// 相对索引转换为绝对索引，之后的压栈不会让它失效
    fn absolute(&self, idx: duk_idx_t) -> duk_idx_t {
        if idx < 0 {
            unsafe { (self.lib().duk_get_top)(self.ctx()) + idx }
        } else {
            idx
        }
    }

    /// 读取 `idx` 处的值，栈深度不变
    pub(crate) fn peek(self: &Rc<Self>, idx: duk_idx_t) -> DukResult<Data> {
        self.peek_at(idx, 0)
    }

    fn peek_at(self: &Rc<Self>, idx: duk_idx_t, depth: usize) -> DukResult<Data> {
        if depth >= MAX_DEPTH {
            return Err(too_deep());
        }
        let idx = self.absolute(idx);
        let api = self.lib();
        let ctx = self.ctx();

        // 数组和函数也是对象，必须先于普通对象判断
        unsafe {
            if api.duk_is_null_or_undefined(ctx, idx) {
                Ok(Data::Null)
            } else if (api.duk_is_boolean)(ctx, idx) != 0 {
                Ok(Data::Boolean((api.duk_get_boolean)(ctx, idx) != 0))
            } else if (api.duk_is_number)(ctx, idx) != 0 {
                Ok(Data::Number((api.duk_get_number)(ctx, idx)))
            } else if (api.duk_is_string)(ctx, idx) != 0 {
                self.peek_string(idx).map(Data::String)
            } else if (api.duk_is_array)(ctx, idx) != 0 {
                self.peek_array(idx, depth)
            } else if (api.duk_is_function)(ctx, idx) != 0 {
                self.peek_function(idx)
            } else if (api.duk_is_object)(ctx, idx) != 0 {
                self.peek_object(idx, depth)
            } else {
                Err(DukError::UnsupportedValue(format!(
                    "unsupported value type (mask {:#x})",
                    (api.duk_get_type_mask)(ctx, idx)
                )))
            }
        }
    }

    fn peek_string(&self, idx: duk_idx_t) -> DukResult<String> {
        let mut len: duk_size_t = 0;
        let ptr = unsafe { (self.lib().duk_get_lstring)(self.ctx(), idx, &mut len) };
        if ptr.is_null() {
            return Err(DukError::UnsupportedValue(
                "string value has no data".to_string(),
            ));
        }

        let bytes = unsafe { slice::from_raw_parts(ptr.cast::<u8>(), len) };
        text::decode(bytes)
            .map(|s| s.into_owned())
            .map_err(|e| DukError::UnsupportedValue(format!("string is not valid UTF-8: {}", e)))
    }

    fn peek_array(self: &Rc<Self>, idx: duk_idx_t, depth: usize) -> DukResult<Data> {
        let frame = StackFrame::enter(self);
        let api = self.lib();

        let flags = DUK_ENUM_OWN_PROPERTIES_ONLY
            | DUK_ENUM_ARRAY_INDICES_ONLY
            | DUK_ENUM_SORT_ARRAY_INDICES;
        self.open_enum(idx, flags)?;
        let enum_idx = frame.top();

        let mut items = Vec::new();
        while self.next_entry(enum_idx)? {
            items.push(self.peek_at(-1, depth + 1)?);
            unsafe { (api.duk_set_top)(self.ctx(), enum_idx + 1) };
        }
        Ok(Data::Array(items))
    }

    fn peek_object(self: &Rc<Self>, idx: duk_idx_t, depth: usize) -> DukResult<Data> {
        let frame = StackFrame::enter(self);
        let api = self.lib();

        self.open_enum(idx, DUK_ENUM_OWN_PROPERTIES_ONLY)?;
        let enum_idx = frame.top();

        let mut map = HashMap::new();
        while self.next_entry(enum_idx)? {
            let key = self.peek_string(enum_idx + 1)?;
            let value = self.peek_at(enum_idx + 2, depth + 1)?;
            map.insert(key, value);
            unsafe { (api.duk_set_top)(self.ctx(), enum_idx + 1) };
        }
        Ok(Data::Object(map))
    }

    fn peek_function(self: &Rc<Self>, idx: duk_idx_t) -> DukResult<Data> {
        // 之前推入的宿主函数原样取回
        if let Some(function) = callbacks::host_function_at(self, idx)? {
            return Ok(Data::Function(function));
        }

        let ptr = unsafe { (self.lib().duk_get_heapptr)(self.ctx(), idx) };
        if ptr.is_null() {
            return Err(DukError::UnsupportedValue(
                "function has no heap pointer".to_string(),
            ));
        }
        // 先入 stash，再交出包装器
        callbacks::stash(self, ptr)?;
        Ok(Data::Function(Function::from_script(ScriptFunction::new(
            self, ptr,
        ))))
    }

    /// 把值压入栈顶，失败时栈深度不变
    pub(crate) fn push(self: &Rc<Self>, value: &Data) -> DukResult<()> {
        self.push_at(value, 0)
    }

    fn push_at(self: &Rc<Self>, value: &Data, depth: usize) -> DukResult<()> {
        if depth >= MAX_DEPTH {
            return Err(too_deep());
        }
        self.reserve(1)?;
        let api = self.lib();
        let ctx = self.ctx();

        match value {
            Data::Null => unsafe { (api.duk_push_null)(ctx) },
            Data::Boolean(b) => unsafe { (api.duk_push_boolean)(ctx, duk_bool_t::from(*b)) },
            Data::Number(n) => unsafe { (api.duk_push_number)(ctx, *n) },
            Data::String(s) => {
                let bytes = text::encode(s);
                unsafe { (api.duk_push_lstring)(ctx, bytes.as_ptr().cast(), bytes.len()) };
            }
            Data::Array(items) => return self.push_array(items, depth),
            Data::Object(map) => return self.push_object(map, depth),
            Data::Function(function) => return self.push_function(function),
        }
        Ok(())
    }

    fn push_array(self: &Rc<Self>, items: &[Data], depth: usize) -> DukResult<()> {
        let api = self.lib();
        let ctx = self.ctx();
        let arr = unsafe { (api.duk_push_array)(ctx) };

        let result = items.iter().enumerate().try_for_each(|(i, item)| {
            let index = duk_uarridx_t::try_from(i).map_err(|_| {
                DukError::UnsupportedValue(format!("array index {} out of range", i))
            })?;
            self.push_at(item, depth + 1)?;
            self.put_index(arr, index)
        });

        if result.is_err() {
            unsafe { (api.duk_set_top)(ctx, arr) };
        }
        result
    }

    fn push_object(self: &Rc<Self>, map: &HashMap<String, Data>, depth: usize) -> DukResult<()> {
        let api = self.lib();
        let ctx = self.ctx();
        let obj = unsafe { (api.duk_push_object)(ctx) };

        let result = map.iter().try_for_each(|(key, value)| {
            self.push_at(value, depth + 1)?;
            self.put_prop(obj, &text::encode(key))
        });

        if result.is_err() {
            unsafe { (api.duk_set_top)(ctx, obj) };
        }
        result
    }

    fn push_function(self: &Rc<Self>, function: &Function) -> DukResult<()> {
        match function.as_script() {
            Some(script) if script.belongs_to(self) => {
                unsafe { (self.lib().duk_push_heapptr)(self.ctx(), script.heap_ptr()) };
                Ok(())
            }
            // 其他堆的脚本函数与宿主函数一样经由原生回调桥接
            _ => callbacks::push_host_function(self, function.clone()),
        }
    }
}
