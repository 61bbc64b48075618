//! 动态库配置

use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// 动态库基础名，平台前后缀由 `libloading::library_filename` 补全
pub const LIBRARY_NAME: &str = "duktape";

/// 动态库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// 显式指定的动态库路径
    pub path: Option<PathBuf>,

    /// 未指定路径时，是否在可执行文件所在目录查找
    pub search_executable_dir: bool,
}

impl_default!(LibraryConfig {
    path: None,
    search_executable_dir: true,
});

impl LibraryConfig {
    /// 使用指定路径
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(path) = &self.path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Library path must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// 解析最终加载路径
    ///
    /// 显式路径优先；否则查找可执行文件旁的平台库文件；
    /// 都不存在时返回裸文件名，交给系统加载器搜索。
    pub fn resolve_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }

        let file_name = libloading::library_filename(LIBRARY_NAME);
        if self.search_executable_dir {
            let exe_dir = env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf));
            if let Some(dir) = exe_dir {
                let candidate = dir.join(&file_name);
                if candidate.is_file() {
                    return candidate;
                }
            }
        }

        PathBuf::from(file_name)
    }
}
