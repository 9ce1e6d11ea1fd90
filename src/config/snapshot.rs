//! 配置快照存储
//!
//! 为回滚保留有界的线性撤销栈

use crate::config::overrides::OverrideMap;
use crate::config::types::Config;
use chrono::{DateTime, Utc};

/// 默认保留的最大快照数
pub const MAX_SNAPSHOTS: usize = 10;

/// 配置快照
///
/// 在每次成功应用（含初始加载）时创建的不可变副本
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    /// 应用成功后的配置（深拷贝）
    pub config: Config,
    /// 当时的覆盖表（深拷贝）
    pub overrides: OverrideMap,
    /// 快照时间
    pub timestamp: DateTime<Utc>,
}

/// 有界的配置快照存储
///
/// 线性撤销栈：回滚选中目标后历史被截断到该点，不保留分支
#[derive(Debug)]
pub struct ConfigSnapshotStore {
    snapshots: Vec<ConfigSnapshot>,
    max_snapshots: usize,
}

impl ConfigSnapshotStore {
    /// 创建默认容量的快照存储
    pub fn new() -> Self {
        Self::with_capacity(MAX_SNAPSHOTS)
    }

    /// 创建指定容量的快照存储
    ///
    /// # 参数
    /// * `max_snapshots` - 保留的最大快照数，至少为1
    pub fn with_capacity(max_snapshots: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            max_snapshots: max_snapshots.max(1),
        }
    }

    /// 追加一个新快照，超出容量时淘汰最旧的
    ///
    /// # 参数
    /// * `config` - 应用成功后的配置
    /// * `overrides` - 当时的覆盖表
    pub fn push(&mut self, config: &Config, overrides: &OverrideMap) {
        self.snapshots.push(ConfigSnapshot {
            config: config.clone(),
            overrides: overrides.clone(),
            timestamp: Utc::now(),
        });

        while self.snapshots.len() > self.max_snapshots {
            self.snapshots.remove(0);
        }
    }

    /// 快照数量
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// 最近的快照
    pub fn latest(&self) -> Option<&ConfigSnapshot> {
        self.snapshots.last()
    }

    /// 按时间顺序（最旧在前）返回全部快照
    pub fn snapshots(&self) -> &[ConfigSnapshot] {
        &self.snapshots
    }

    /// 选择回滚目标：最近快照之前第 `steps` 个位置的快照
    ///
    /// 仅当 `steps < len` 时有效；选择本身不修改存储
    pub fn target(&self, steps: usize) -> Option<&ConfigSnapshot> {
        if steps >= self.snapshots.len() {
            return None;
        }
        self.snapshots.get(self.snapshots.len() - 1 - steps)
    }

    /// 提交回滚：截断历史，使目标快照成为最近的快照
    ///
    /// 必须在 `target(steps)` 返回 `Some` 之后调用
    pub fn truncate_to_target(&mut self, steps: usize) {
        if steps < self.snapshots.len() {
            let keep = self.snapshots.len() - steps;
            self.snapshots.truncate(keep);
        }
    }

    /// 清除历史，只保留当前（最近）快照
    pub fn clear_keep_latest(&mut self) {
        if self.snapshots.len() > 1 {
            let latest = self.snapshots.len() - 1;
            self.snapshots.drain(..latest);
        }
    }
}

impl Default for ConfigSnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
