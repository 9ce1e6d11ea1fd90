//! 错误处理模块
//!
//! 定义配置热重载子系统的统一错误类型

use thiserror::Error;

/// Config Pulse 的主要错误类型
#[derive(Error, Debug)]
pub enum ConfigPulseError {
    /// 配置验证相关错误
    #[error("配置验证错误: {0}")]
    Validation(#[from] ValidationError),

    /// 配置重载相关错误
    #[error("配置重载错误: {0}")]
    Reload(#[from] ReloadError),

    /// 文件监控相关错误
    #[error("文件监控错误: {0}")]
    Watch(#[from] WatchError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置验证错误类型
///
/// 由加载器、`validate()` 调用和管理器构造过程抛出
#[derive(Error, Debug)]
pub enum ValidationError {
    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    Parse(String),

    /// 配置结构/语义验证错误
    #[error("配置验证失败: {0}")]
    Schema(String),

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVar { var: String },
}

/// 配置重载错误类型
///
/// 任何返回该错误的操作都保证未修改管理器状态
#[derive(Error, Debug)]
pub enum ReloadError {
    /// 重载过程中的验证失败
    #[error("配置重载失败: {0}")]
    Validation(#[from] ValidationError),

    /// 回滚步数超出可用的快照历史
    #[error("回滚步数 {steps} 超出可用历史（共 {available} 个快照）")]
    HistoryExhausted { steps: usize, available: usize },

    /// 管理器已释放，不再接受变更操作
    #[error("配置管理器已释放")]
    Disposed,
}

/// 文件监控错误类型
#[derive(Error, Debug)]
pub enum WatchError {
    /// 底层文件系统监控错误
    #[error("文件系统监控失败: {0}")]
    Notify(#[from] notify::Error),

    /// 无法获取异步运行时句柄
    #[error("无法获取异步运行时句柄，监控器必须在tokio运行时内启动")]
    RuntimeUnavailable,
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ConfigPulseError>;
