//! 受保护的引擎原语
//!
//! 属性读写和枚举在失败时由引擎直接抛出（getter、setter、只读属性、
//! Proxy 陷阱）。没有捕获点时引擎进入致命错误处理器；在原生回调里，
//! 抛出会越过回调的 Rust 栈帧。所以这些原语都经由 `duk_safe_call` 执行：
//! 参数先复制到栈顶，回调体只做一次引擎调用，栈帧上没有需要析构的值。

use super::interpreter::Heap;
use super::text;
use crate::bindings::ffi::*;
use crate::bindings::DukApi;
use crate::core::{DukError, DukResult};
use std::os::raw::{c_char, c_void};

#[derive(Clone, Copy)]
enum Access {
    /// `[] -> [value]`
    GetGlobal,
    /// `[value] -> []`
    PutGlobal,
    /// `[obj] -> [value]`
    GetProp,
    /// `[value, obj] -> []`
    PutProp,
    /// `[value, obj] -> []`
    PutIndex(duk_uarridx_t),
    /// `[obj] -> [enum]`
    Enum(duk_uint_t),
    /// `[enum] -> [key, value]`，结束时 `found` 为 0
    Next,
}

struct Request {
    api: *const DukApi,
    access: Access,
    key: *const c_char,
    len: duk_size_t,
    found: duk_bool_t,
}

unsafe extern "C" fn access_body(ctx: *mut duk_context, udata: *mut c_void) -> duk_ret_t {
    let req = &mut *udata.cast::<Request>();
    let api = &*req.api;

    match req.access {
        Access::GetGlobal => {
            (api.duk_get_global_lstring)(ctx, req.key, req.len);
            1
        }
        Access::PutGlobal => {
            (api.duk_put_global_lstring)(ctx, req.key, req.len);
            0
        }
        Access::GetProp => {
            (api.duk_get_prop_lstring)(ctx, -1, req.key, req.len);
            1
        }
        Access::PutProp => {
            (api.duk_dup)(ctx, -2);
            (api.duk_put_prop_lstring)(ctx, -2, req.key, req.len);
            0
        }
        Access::PutIndex(index) => {
            (api.duk_dup)(ctx, -2);
            (api.duk_put_prop_index)(ctx, -2, index);
            0
        }
        Access::Enum(flags) => {
            (api.duk_enum)(ctx, -1, flags);
            1
        }
        Access::Next => {
            req.found = (api.duk_next)(ctx, -1, 1);
            if req.found != 0 {
                2
            } else {
                0
            }
        }
    }
}

impl Heap {
    /// 以栈顶 `nargs` 个值为参数执行 `access`
    ///
    /// 成功时参数被替换为 `nrets` 个结果；失败时参数被移除，
    /// 返回引擎错误的诊断文本。
    fn protected(
        &self,
        access: Access,
        key: &[u8],
        nargs: duk_idx_t,
        nrets: duk_idx_t,
    ) -> Result<duk_bool_t, String> {
        let api = self.lib();
        let ctx = self.ctx();
        let mut req = Request {
            api,
            access,
            key: key.as_ptr().cast(),
            len: key.len(),
            found: 0,
        };

        let rc = unsafe {
            (api.duk_safe_call)(
                ctx,
                access_body,
                (&mut req as *mut Request).cast(),
                nargs,
                nrets,
            )
        };
        if rc == DUK_EXEC_SUCCESS {
            return Ok(req.found);
        }

        // 错误值在结果区的第一个位置
        let msg = self.error_text(-nrets);
        unsafe { (api.duk_set_top)(ctx, (api.duk_get_top)(ctx) - nrets) };
        Err(msg)
    }

    fn dup(&self, idx: duk_idx_t) {
        unsafe { (self.lib().duk_dup)(self.ctx(), idx) };
    }

    /// 读取全局变量压入栈顶
    pub(crate) fn get_global(&self, name: &str) -> DukResult<()> {
        self.reserve(2)?;
        let key = text::encode(name);
        self.protected(Access::GetGlobal, &key, 0, 1)
            .map(drop)
            .map_err(DukError::Evaluation)
    }

    /// 栈顶值写入全局变量，值被消耗
    pub(crate) fn put_global(&self, name: &str) -> DukResult<()> {
        self.reserve(2)?;
        let key = text::encode(name);
        self.protected(Access::PutGlobal, &key, 1, 1)
            .map_err(|msg| {
                DukError::Property(format!("could not assign global '{}': {}", name, msg))
            })?;
        self.pop();
        Ok(())
    }

    /// 读取 `idx` 处对象的属性压入栈顶
    pub(crate) fn get_prop(&self, idx: duk_idx_t, key: &[u8]) -> DukResult<()> {
        self.reserve(3)?;
        self.dup(idx);
        self.protected(Access::GetProp, key, 1, 1)
            .map(drop)
            .map_err(DukError::Evaluation)
    }

    /// 栈顶值写入 `obj` 处对象的属性，值被消耗
    pub(crate) fn put_prop(&self, obj: duk_idx_t, key: &[u8]) -> DukResult<()> {
        self.reserve(3)?;
        self.dup(obj);
        self.protected(Access::PutProp, key, 2, 1)
            .map_err(|msg| {
                DukError::Property(format!(
                    "could not set property '{}': {}",
                    String::from_utf8_lossy(key),
                    msg
                ))
            })?;
        self.pop();
        Ok(())
    }

    /// 栈顶值写入 `obj` 处数组的下标，值被消耗
    pub(crate) fn put_index(&self, obj: duk_idx_t, index: duk_uarridx_t) -> DukResult<()> {
        self.reserve(3)?;
        self.dup(obj);
        self.protected(Access::PutIndex(index), &[], 2, 1)
            .map_err(|msg| {
                DukError::Property(format!("could not set array index {}: {}", index, msg))
            })?;
        self.pop();
        Ok(())
    }

    /// 打开 `idx` 处对象的枚举器压入栈顶
    pub(crate) fn open_enum(&self, idx: duk_idx_t, flags: duk_uint_t) -> DukResult<()> {
        self.reserve(3)?;
        self.dup(idx);
        self.protected(Access::Enum(flags), &[], 1, 1)
            .map(drop)
            .map_err(DukError::Evaluation)
    }

    /// 推进枚举器；有下一项时键和值压入栈顶并返回 `true`
    pub(crate) fn next_entry(&self, enum_idx: duk_idx_t) -> DukResult<bool> {
        self.reserve(4)?;
        self.dup(enum_idx);
        let found = self
            .protected(Access::Next, &[], 1, 2)
            .map_err(DukError::Evaluation)?;
        if found == 0 {
            let api = self.lib();
            unsafe { (api.duk_set_top)(self.ctx(), (api.duk_get_top)(self.ctx()) - 2) };
        }
        Ok(found != 0)
    }

    fn pop(&self) {
        let api = self.lib();
        unsafe { (api.duk_set_top)(self.ctx(), (api.duk_get_top)(self.ctx()) - 1) };
    }
}
