//! 核心宏定义
//!
//! 提供统一的宏来减少代码重复

/// 为配置结构体实现Default trait的宏
///
/// 使用示例:
/// ```ignore
/// struct LibraryConfig {
///     path: Option<PathBuf>,
///     search_executable_dir: bool,
/// }
///
/// impl_default!(LibraryConfig {
///     path: None,
///     search_executable_dir: true,
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}
