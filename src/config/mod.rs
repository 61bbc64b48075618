//! 统一配置系统
//!
//! 提供TOML/JSON配置文件、环境变量覆盖和日志初始化
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod library;
pub mod logging;

pub use library::{LibraryConfig, LIBRARY_NAME};
pub use logging::{init_logging, LogLevel, LoggingConfig};

/// 指向Duktape动态库的环境变量
pub const ENV_LIBRARY_PATH: &str = "DUKTAPE_LIB";
/// 覆盖日志级别的环境变量
pub const ENV_LOG_LEVEL: &str = "DUKTAPE_LOG_LEVEL";

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 桥接层主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// 动态库配置
    #[serde(default)]
    pub library: LibraryConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = env::var_os(ENV_LIBRARY_PATH) {
            if !path.is_empty() {
                self.library.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(val) = env::var(ENV_LOG_LEVEL) {
            match val.parse() {
                Ok(level) => self.logging.level = level,
                Err(e) => tracing::warn!(target: "duktape", "Ignoring {}: {}", ENV_LOG_LEVEL, e),
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.library.validate()?;
        Ok(())
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./duktape.toml
    /// 2. ./duktape.json
    /// 3. <用户配置目录>/duktape_bridge/config.toml
    /// 4. 使用默认配置
    ///
    /// 环境变量覆盖最后应用。
    pub fn load_or_default() -> Self {
        let mut config = Self::find_config_file().unwrap_or_else(|| {
            tracing::debug!(target: "duktape", "Using default configuration");
            Self::default()
        });
        config.apply_env_overrides();
        config
    }

    fn find_config_file() -> Option<Self> {
        if let Ok(config) = Self::from_toml_file("duktape.toml") {
            tracing::debug!(target: "duktape", "Loaded config from duktape.toml");
            return Some(config);
        }

        if let Ok(config) = Self::from_json_file("duktape.json") {
            tracing::debug!(target: "duktape", "Loaded config from duktape.json");
            return Some(config);
        }

        let config_path = dirs::config_dir()?
            .join("duktape_bridge")
            .join("config.toml");
        match Self::from_toml_file(&config_path) {
            Ok(config) => {
                tracing::debug!(target: "duktape", "Loaded config from {:?}", config_path);
                Some(config)
            }
            Err(_) => None,
        }
    }
}
