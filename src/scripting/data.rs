//! 脚本值类型
//!
//! `Data` 是宿主与脚本之间唯一的交换类型，两个方向的转换都以它为准。

use super::callbacks::ScriptFunction;
use crate::core::{DukError, DukResult};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// 可被脚本调用的宿主能力：接收参数列表，返回单个值
pub trait Callable {
    fn call(&self, args: &[Data]) -> DukResult<Data>;
}

impl<F> Callable for F
where
    F: Fn(&[Data]) -> DukResult<Data>,
{
    fn call(&self, args: &[Data]) -> DukResult<Data> {
        self(args)
    }
}

/// 函数值
///
/// 宿主函数按 `Rc` 身份比较；脚本函数按其所在堆和堆指针比较。
#[derive(Clone)]
pub struct Function {
    kind: FunctionKind,
}

#[derive(Clone)]
enum FunctionKind {
    Host(Rc<dyn Callable>),
    Script(Rc<ScriptFunction>),
}

impl Function {
    /// 从闭包创建宿主函数
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Data]) -> DukResult<Data> + 'static,
    {
        Self::from_callable(f)
    }

    pub fn from_callable<C: Callable + 'static>(callable: C) -> Self {
        Self {
            kind: FunctionKind::Host(Rc::new(callable)),
        }
    }

    pub(crate) fn from_script(function: ScriptFunction) -> Self {
        Self {
            kind: FunctionKind::Script(Rc::new(function)),
        }
    }

    pub(crate) fn as_script(&self) -> Option<&ScriptFunction> {
        match &self.kind {
            FunctionKind::Script(f) => Some(f),
            FunctionKind::Host(_) => None,
        }
    }

    /// 是否为脚本侧函数
    pub fn is_script(&self) -> bool {
        self.as_script().is_some()
    }

    /// 调用函数
    ///
    /// 脚本函数失败时返回 `DukError::Evaluation`，与 `eval` 失败一致。
    pub fn call(&self, args: &[Data]) -> DukResult<Data> {
        match &self.kind {
            FunctionKind::Host(f) => f.call(args),
            FunctionKind::Script(f) => f.call(args),
        }
    }
}

impl Callable for Function {
    fn call(&self, args: &[Data]) -> DukResult<Data> {
        Function::call(self, args)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (FunctionKind::Host(a), FunctionKind::Host(b)) => Rc::ptr_eq(a, b),
            (FunctionKind::Script(a), FunctionKind::Script(b)) => a.same_object(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FunctionKind::Host(_) => f.write_str("Function(host)"),
            FunctionKind::Script(script) => write!(f, "Function(script {:p})", script.heap_ptr()),
        }
    }
}

/// 脚本值
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Data {
    /// `null` 与 `undefined` 都映射到这里
    #[default]
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Vec<Data>),
    Object(HashMap<String, Data>),
    Function(Function),
}

impl Data {
    /// 从闭包创建函数值
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Data]) -> DukResult<Data> + 'static,
    {
        Data::Function(Function::new(f))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Data::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Data::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Data::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Data::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Data]> {
        match self {
            Data::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Data>> {
        match self {
            Data::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Data::Function(f) => Some(f),
            _ => None,
        }
    }

    /// 类型名，用于错误信息
    pub fn type_name(&self) -> &'static str {
        match self {
            Data::Null => "null",
            Data::Boolean(_) => "boolean",
            Data::Number(_) => "number",
            Data::String(_) => "string",
            Data::Array(_) => "array",
            Data::Object(_) => "object",
            Data::Function(_) => "function",
        }
    }
}

impl From<()> for Data {
    fn from(_: ()) -> Self {
        Data::Null
    }
}

impl From<bool> for Data {
    fn from(b: bool) -> Self {
        Data::Boolean(b)
    }
}

impl From<f64> for Data {
    fn from(n: f64) -> Self {
        Data::Number(n)
    }
}

impl From<f32> for Data {
    fn from(n: f32) -> Self {
        Data::Number(n as f64)
    }
}

impl From<i32> for Data {
    fn from(n: i32) -> Self {
        Data::Number(n as f64)
    }
}

impl From<u32> for Data {
    fn from(n: u32) -> Self {
        Data::Number(n as f64)
    }
}

// Precision beyond 2^53 is lost, as on the script side.
impl From<i64> for Data {
    fn from(n: i64) -> Self {
        Data::Number(n as f64)
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Data::String(s.to_string())
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Data::String(s)
    }
}

impl From<Function> for Data {
    fn from(f: Function) -> Self {
        Data::Function(f)
    }
}

impl<T: Into<Data>> From<Vec<T>> for Data {
    fn from(items: Vec<T>) -> Self {
        Data::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Data>> From<HashMap<String, T>> for Data {
    fn from(map: HashMap<String, T>) -> Self {
        Data::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Data>> From<Option<T>> for Data {
    fn from(value: Option<T>) -> Self {
        value.map_or(Data::Null, Into::into)
    }
}

impl From<serde_json::Value> for Data {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Data::Null,
            serde_json::Value::Bool(b) => Data::Boolean(b),
            serde_json::Value::Number(n) => Data::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => Data::String(s),
            serde_json::Value::Array(items) => {
                Data::Array(items.into_iter().map(Data::from).collect())
            }
            serde_json::Value::Object(map) => {
                Data::Object(map.into_iter().map(|(k, v)| (k, Data::from(v))).collect())
            }
        }
    }
}

/// 2^53，超过后整数不能在 f64 中精确表示
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

impl TryFrom<Data> for serde_json::Value {
    type Error = DukError;

    fn try_from(data: Data) -> DukResult<Self> {
        Ok(match data {
            Data::Null => serde_json::Value::Null,
            Data::Boolean(b) => serde_json::Value::Bool(b),
            Data::Number(n) if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER => {
                serde_json::Value::from(n as i64)
            }
            Data::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .ok_or_else(|| {
                    DukError::UnsupportedValue(format!("non-finite number {} has no JSON form", n))
                })?,
            Data::String(s) => serde_json::Value::String(s),
            Data::Array(items) => serde_json::Value::Array(
                items
                    .into_iter()
                    .map(serde_json::Value::try_from)
                    .collect::<DukResult<_>>()?,
            ),
            Data::Object(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| -> DukResult<(String, serde_json::Value)> {
                        Ok((k, serde_json::Value::try_from(v)?))
                    })
                    .collect::<DukResult<_>>()?,
            ),
            Data::Function(_) => {
                return Err(DukError::UnsupportedValue(
                    "functions have no JSON form".to_string(),
                ))
            }
        })
    }
}
