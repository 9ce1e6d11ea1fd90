//! 配置变更事件定义
//!
//! 监控器产生、事件总线消费的不可变事件类型

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// 配置变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigChangeKind {
    /// 文件被创建
    Created,
    /// 文件内容被修改
    Modified,
    /// 文件被删除
    Deleted,
    /// 文件被移动
    Moved,
}

impl fmt::Display for ConfigChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigChangeKind::Created => "created",
            ConfigChangeKind::Modified => "modified",
            ConfigChangeKind::Deleted => "deleted",
            ConfigChangeKind::Moved => "moved",
        };
        write!(f, "{}", name)
    }
}

/// 配置变更事件
///
/// 由监控器在确认真实变更后构造，经事件总线分发给处理器；
/// 构造后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChangeEvent {
    /// 变更类型
    pub kind: ConfigChangeKind,
    /// 变更涉及的文件路径
    pub path: PathBuf,
    /// 移动前的路径（仅Moved事件）
    pub old_path: Option<PathBuf>,
    /// 变更后的内容校验和（仅Created/Modified事件）
    pub checksum: Option<String>,
    /// 变更时间
    pub timestamp: DateTime<Utc>,
}

impl ConfigChangeEvent {
    /// 构造文件创建事件
    pub fn created(path: PathBuf, checksum: Option<String>) -> Self {
        Self {
            kind: ConfigChangeKind::Created,
            path,
            old_path: None,
            checksum,
            timestamp: Utc::now(),
        }
    }

    /// 构造文件修改事件
    pub fn modified(path: PathBuf, checksum: Option<String>) -> Self {
        Self {
            kind: ConfigChangeKind::Modified,
            path,
            old_path: None,
            checksum,
            timestamp: Utc::now(),
        }
    }

    /// 构造文件删除事件
    pub fn deleted(path: PathBuf) -> Self {
        Self {
            kind: ConfigChangeKind::Deleted,
            path,
            old_path: None,
            checksum: None,
            timestamp: Utc::now(),
        }
    }

    /// 构造文件移动事件
    ///
    /// # 参数
    /// * `old_path` - 移动前的路径
    /// * `path` - 移动后的路径
    pub fn moved(old_path: PathBuf, path: PathBuf) -> Self {
        Self {
            kind: ConfigChangeKind::Moved,
            path,
            old_path: Some(old_path),
            checksum: None,
            timestamp: Utc::now(),
        }
    }
}
