//! 统一错误处理模块
//!
//! 提供桥接层范围内的统一错误类型定义
//!
//! ## 错误分类
//!
//! - **脚本层错误** (`Evaluation`): 语法错误、脚本抛出的异常、宿主回调失败，
//!   携带引擎生成的堆栈文本。调用方可以恢复，返回前引擎栈已恢复。
//! - **协议错误** (`UnsupportedValue`, `Property`): 值无法在两侧之间转换，
//!   属于编程错误而非运行时状态。
//! - **加载错误** (`Load`, `Symbol`, `HeapCreation`): 动态库或堆初始化失败。
//!
//! 引擎自身报告的致命错误不经过这里，见 `scripting::callbacks`。

use crate::config::ConfigError;
use thiserror::Error;

/// 桥接层错误类型
#[derive(Error, Debug)]
pub enum DukError {
    /// 脚本执行失败，内容为引擎给出的诊断文本
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),

    /// 引擎拒绝了属性或全局变量的赋值
    #[error("Property assignment failed: {0}")]
    Property(String),

    /// 宿主回调返回的错误
    #[error("Callback error: {0}")]
    Callback(String),

    #[error("Failed to load library: {0}")]
    Load(String),

    #[error("Failed to get symbol: {0}")]
    Symbol(String),

    #[error("Failed to create duktape heap")]
    HeapCreation,

    /// 解释器已销毁，引擎堆不再可用
    #[error("Interpreter destroyed")]
    Destroyed,

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl DukError {
    /// 构造宿主回调错误
    pub fn callback(msg: impl Into<String>) -> Self {
        DukError::Callback(msg.into())
    }

    /// 脚本层错误的诊断文本
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            DukError::Evaluation(msg) => Some(msg),
            _ => None,
        }
    }
}

/// 桥接层结果类型别名
pub type DukResult<T> = Result<T, DukError>;
