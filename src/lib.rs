//! Config Pulse - 运行中服务的配置热重载子系统
//!
//! 这是一个用Rust编写的配置热重载库，支持：
//! - 校验和去重、防抖动合并的配置文件监控
//! - 按类型过滤的配置变更事件总线
//! - 验证通过才生效的原子化热重载
//! - 有界快照历史与回滚
//! - 点路径覆盖层
//! - 结构化日志记录

pub mod config;
pub mod error;
pub mod logging;

// 重新导出主要类型
pub use config::{
    ChecksumFileWatcher, Config, ConfigChangeEvent, ConfigChangeKind, ConfigEventBus,
    ConfigLifecycleManager, ConfigSnapshot, OverrideMap,
};
pub use error::ConfigPulseError;

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 库描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
