//! 配置文件监控模块
//!
//! 以校验和去重、防抖动合并的方式把原始文件系统通知转化为
//! [`ConfigChangeEvent`] 并投递到事件总线

use crate::config::bus::{default_event_bus, ConfigEventBus};
use crate::config::events::{ConfigChangeEvent, ConfigChangeKind};
use crate::error::{Result, WatchError};
use chrono::Utc;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 默认防抖动延迟
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// 计算字节内容的SHA-256校验和（十六进制编码）
fn checksum_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// 读取文件并计算校验和
fn compute_checksum(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(checksum_bytes(&bytes))
}

/// 把待监控路径规范化为"规范化父目录 + 文件名"
///
/// 操作系统通知按目录投递，事件中的路径以规范化目录为前缀，
/// 统一规范化后才能与监控集合精确匹配
pub(crate) fn canonical_watch_path(path: &Path) -> Option<PathBuf> {
    let file_name = path.file_name()?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let canonical_parent = parent.canonicalize().ok()?;
    Some(canonical_parent.join(file_name))
}

/// 单个被监控文件的记录：最近确认的内容校验和
///
/// 删除后基线清空，等待Create事件重新建立
struct WatchedFile {
    checksum: Option<String>,
}

/// 待分发的变更：同一路径只保留一个槽位，时间戳被覆盖而不排队
struct PendingChange {
    kind: ConfigChangeKind,
    checksum: Option<String>,
    marked_at: Instant,
}

/// 单个目录的监控状态
#[derive(Default)]
struct DirectoryWatch {
    /// 目录级的操作系统监控器，运行期间存在
    monitor: Option<RecommendedWatcher>,
    /// 该目录下被监控的文件
    files: HashSet<PathBuf>,
    /// 待分发的变更
    pending: HashMap<PathBuf, PendingChange>,
    /// 自重调度的防抖动定时任务
    timer: Option<JoinHandle<()>>,
}

/// 监控集合：文件按父目录分组，共享目录级监控器
#[derive(Default)]
struct WatchState {
    files: HashMap<PathBuf, WatchedFile>,
    directories: HashMap<PathBuf, DirectoryWatch>,
}

/// 监控器内部共享状态
struct WatcherInner {
    bus: Arc<ConfigEventBus>,
    debounce_delay: Duration,
    state: Mutex<WatchState>,
    running: AtomicBool,
    /// 启动时捕获的运行时句柄，通知线程用它调度防抖动任务
    runtime: Mutex<Option<Handle>>,
}

/// 校验和去重的配置文件监控器
///
/// 按目录分组监控显式指定的文件路径，对原始通知做防抖动合并
/// 和校验和比对，只把真实的内容变更作为 [`ConfigChangeEvent`]
/// 分发到事件总线
pub struct ChecksumFileWatcher {
    inner: Arc<WatcherInner>,
}

impl ChecksumFileWatcher {
    /// 创建使用默认事件总线的监控器
    ///
    /// # 参数
    /// * `debounce_delay` - 防抖动延迟时间
    pub fn new(debounce_delay: Duration) -> Self {
        Self::with_bus(debounce_delay, default_event_bus())
    }

    /// 创建使用指定事件总线的监控器
    ///
    /// # 参数
    /// * `debounce_delay` - 防抖动延迟时间
    /// * `bus` - 事件分发的目标总线
    pub fn with_bus(debounce_delay: Duration, bus: Arc<ConfigEventBus>) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                bus,
                debounce_delay,
                state: Mutex::new(WatchState::default()),
                running: AtomicBool::new(false),
                runtime: Mutex::new(None),
            }),
        }
    }

    /// 添加一个待监控的文件
    ///
    /// 幂等：已监控的路径被忽略；不存在的路径记录日志后忽略。
    /// 文件按父目录归入同一个目录监控器（目录首个文件时惰性
    /// 创建），并记录初始校验和基线
    ///
    /// # 参数
    /// * `path` - 文件路径，注册时必须存在
    pub async fn add<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let raw = path.as_ref();
        let Some(canonical) = canonical_watch_path(raw) else {
            warn!("无法解析待监控路径: {}，忽略", raw.display());
            return Ok(());
        };
        if !canonical.is_file() {
            warn!("待监控文件不存在: {}，忽略", canonical.display());
            return Ok(());
        }

        // 在锁外读取文件建立初始基线
        let checksum = match tokio::fs::read(&canonical).await {
            Ok(bytes) => Some(checksum_bytes(&bytes)),
            Err(e) => {
                warn!(
                    "读取文件 {} 失败: {}，初始校验和基线暂缺",
                    canonical.display(),
                    e
                );
                None
            }
        };

        let dir = parent_dir(&canonical);
        let mut state = self.inner.state.lock().unwrap();

        if state.files.contains_key(&canonical) {
            debug!("文件已在监控中: {}", canonical.display());
            return Ok(());
        }

        state
            .files
            .insert(canonical.clone(), WatchedFile { checksum });
        let entry = state.directories.entry(dir.clone()).or_default();
        entry.files.insert(canonical.clone());

        // 监控器运行中时为新目录立即创建操作系统监控
        if self.inner.running.load(Ordering::SeqCst) && entry.monitor.is_none() {
            let monitor = create_monitor(&self.inner, &dir).map_err(WatchError::Notify)?;
            entry.monitor = Some(monitor);
        }

        info!("开始监控配置文件: {}", canonical.display());
        Ok(())
    }

    /// 停止监控一个文件
    ///
    /// 该目录下最后一个文件被移除时撤销目录监控器
    ///
    /// # 参数
    /// * `path` - 文件路径
    pub fn remove<P: AsRef<Path>>(&self, path: P) {
        let raw = path.as_ref();
        let canonical = canonical_watch_path(raw).unwrap_or_else(|| raw.to_path_buf());

        let mut state = self.inner.state.lock().unwrap();
        if state.files.remove(&canonical).is_none() {
            debug!("文件不在监控中: {}", canonical.display());
            return;
        }

        let dir = parent_dir(&canonical);
        let mut drop_dir = false;
        if let Some(entry) = state.directories.get_mut(&dir) {
            entry.files.remove(&canonical);
            entry.pending.remove(&canonical);
            drop_dir = entry.files.is_empty();
        }

        if drop_dir {
            if let Some(mut entry) = state.directories.remove(&dir) {
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                }
            }
            debug!("撤销目录监控: {}", dir.display());
        }

        info!("停止监控配置文件: {}", canonical.display());
    }

    /// 启动监控
    ///
    /// 没有待监控文件时不启动；重复启动是空操作。必须在tokio
    /// 运行时内调用，启动时捕获的句柄用于调度防抖动任务
    pub fn start(&self) -> std::result::Result<(), WatchError> {
        if self.inner.running.load(Ordering::SeqCst) {
            debug!("监控器已在运行，忽略重复启动");
            return Ok(());
        }

        let handle = Handle::try_current().map_err(|_| WatchError::RuntimeUnavailable)?;

        let mut state = self.inner.state.lock().unwrap();
        if state.files.is_empty() {
            debug!("没有待监控的文件，跳过启动");
            return Ok(());
        }

        let dirs: Vec<PathBuf> = state.directories.keys().cloned().collect();
        for dir in dirs {
            let needs_monitor = state
                .directories
                .get(&dir)
                .map(|entry| entry.monitor.is_none())
                .unwrap_or(false);
            if !needs_monitor {
                continue;
            }

            match create_monitor(&self.inner, &dir) {
                Ok(monitor) => {
                    if let Some(entry) = state.directories.get_mut(&dir) {
                        entry.monitor = Some(monitor);
                    }
                }
                Err(e) => {
                    // 启动失败时整体回退，不留下部分监控的状态
                    for entry in state.directories.values_mut() {
                        entry.monitor = None;
                    }
                    return Err(WatchError::Notify(e));
                }
            }
        }

        *self.inner.runtime.lock().unwrap() = Some(handle);
        self.inner.running.store(true, Ordering::SeqCst);
        info!(
            "配置文件监控已启动，文件数: {}，目录数: {}",
            state.files.len(),
            state.directories.len()
        );
        Ok(())
    }

    /// 停止监控
    ///
    /// 撤销全部目录监控器并取消在途的防抖动定时器；已停止时是
    /// 空操作，停止后可以再次启动
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            debug!("监控器未在运行，忽略停止请求");
            return;
        }

        let mut state = self.inner.state.lock().unwrap();
        for entry in state.directories.values_mut() {
            entry.monitor = None;
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
            entry.pending.clear();
        }
        *self.inner.runtime.lock().unwrap() = None;

        info!("配置文件监控已停止");
    }

    /// 监控器是否在运行
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// 被监控的文件数量
    pub fn watched_file_count(&self) -> usize {
        self.inner.state.lock().unwrap().files.len()
    }

    /// 持有目录监控器引用的目录数量
    pub fn watched_directory_count(&self) -> usize {
        self.inner.state.lock().unwrap().directories.len()
    }

    /// 防抖动延迟
    pub fn debounce_delay(&self) -> Duration {
        self.inner.debounce_delay
    }
}

impl Drop for ChecksumFileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 规范化路径的父目录
fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// 为一个目录创建操作系统级监控器
///
/// 回调通过弱引用访问共享状态，避免监控器与状态互相持有
fn create_monitor(
    inner: &Arc<WatcherInner>,
    dir: &Path,
) -> std::result::Result<RecommendedWatcher, notify::Error> {
    let weak: Weak<WatcherInner> = Arc::downgrade(inner);
    let mut monitor = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match res {
                Ok(event) => WatcherInner::handle_fs_event(&inner, event),
                Err(e) => error!("文件监控事件错误: {}", e),
            }
        },
        notify::Config::default(),
    )?;
    monitor.watch(dir, RecursiveMode::NonRecursive)?;
    debug!("创建目录监控: {}", dir.display());
    Ok(monitor)
}

impl WatcherInner {
    /// 处理一条原始文件系统通知
    ///
    /// 运行在通知线程上；未监控路径和目录级事件在任何校验和
    /// 计算之前被拒绝
    fn handle_fs_event(inner: &Arc<Self>, event: Event) {
        match event.kind {
            EventKind::Create(_) => {
                for path in &event.paths {
                    Self::on_created(inner, path);
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => {
                Self::on_renamed(inner, mode, &event.paths);
            }
            EventKind::Modify(_) => {
                for path in &event.paths {
                    Self::on_modified(inner, path);
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    inner.on_removed(path);
                }
            }
            _ => {}
        }
    }

    fn is_watched(&self, path: &Path) -> bool {
        self.state.lock().unwrap().files.contains_key(path)
    }

    /// 处理修改通知：校验和未变化的通知（mtime触碰、重复通知）
    /// 被丢弃，真实变更更新基线并进入待分发集合
    fn on_modified(inner: &Arc<Self>, path: &Path) {
        if !inner.is_watched(path) {
            return;
        }

        let checksum = match compute_checksum(path) {
            Ok(sum) => sum,
            Err(e) => {
                // 瞬时IO竞争不能杀死监控器，按无变化处理
                warn!(
                    "计算文件 {} 校验和失败: {}，按无变化处理",
                    path.display(),
                    e
                );
                return;
            }
        };

        let mut state = inner.state.lock().unwrap();
        let Some(file) = state.files.get_mut(path) else {
            return;
        };
        if file.checksum.as_deref() == Some(checksum.as_str()) {
            debug!("文件 {} 内容未变化，丢弃通知", path.display());
            return;
        }
        file.checksum = Some(checksum.clone());
        Self::mark_pending(
            inner,
            &mut state,
            path,
            ConfigChangeKind::Modified,
            Some(checksum),
        );
    }

    /// 处理创建通知：没有基线比较，重新建立基线后始终进入
    /// 待分发集合（删除后重建的文件由此重新获得基线）
    fn on_created(inner: &Arc<Self>, path: &Path) {
        if !inner.is_watched(path) {
            return;
        }

        let checksum = match compute_checksum(path) {
            Ok(sum) => sum,
            Err(e) => {
                warn!(
                    "计算新建文件 {} 校验和失败: {}，事件被抑制",
                    path.display(),
                    e
                );
                return;
            }
        };

        let mut state = inner.state.lock().unwrap();
        let Some(file) = state.files.get_mut(path) else {
            return;
        };
        file.checksum = Some(checksum.clone());
        Self::mark_pending(
            inner,
            &mut state,
            path,
            ConfigChangeKind::Created,
            Some(checksum),
        );
    }

    /// 处理删除通知：清除基线和待分发槽位，事件不做合并立即分发
    fn on_removed(&self, path: &Path) {
        let event = {
            let mut state = self.state.lock().unwrap();
            let Some(file) = state.files.get_mut(path) else {
                return;
            };
            file.checksum = None;

            let dir = parent_dir(path);
            if let Some(entry) = state.directories.get_mut(&dir) {
                entry.pending.remove(path);
            }
            ConfigChangeEvent::deleted(path.to_path_buf())
        };

        self.bus.dispatch_event(&event);
    }

    /// 处理重命名通知：校验和随文件迁移或被清除，事件立即分发
    fn on_renamed(inner: &Arc<Self>, mode: RenameMode, paths: &[PathBuf]) {
        match mode {
            RenameMode::Both if paths.len() >= 2 => {
                let old_path = &paths[0];
                let new_path = &paths[1];

                let event = {
                    let mut state = inner.state.lock().unwrap();
                    let old_watched = state.files.contains_key(old_path);
                    let new_watched = state.files.contains_key(new_path);
                    if !old_watched && !new_watched {
                        return;
                    }

                    let migrated = if old_watched {
                        let dir = parent_dir(old_path);
                        if let Some(entry) = state.directories.get_mut(&dir) {
                            entry.pending.remove(old_path);
                        }
                        state
                            .files
                            .get_mut(old_path)
                            .and_then(|file| file.checksum.take())
                    } else {
                        None
                    };

                    if new_watched {
                        let relocated = migrated.or_else(|| compute_checksum(new_path).ok());
                        if let Some(file) = state.files.get_mut(new_path) {
                            file.checksum = relocated;
                        }
                    }

                    ConfigChangeEvent::moved(old_path.clone(), new_path.clone())
                };

                inner.bus.dispatch_event(&event);
            }
            RenameMode::From => {
                for path in paths {
                    let event = {
                        let mut state = inner.state.lock().unwrap();
                        let Some(file) = state.files.get_mut(path) else {
                            continue;
                        };
                        file.checksum = None;
                        let dir = parent_dir(path);
                        if let Some(entry) = state.directories.get_mut(&dir) {
                            entry.pending.remove(path);
                        }
                        ConfigChangeEvent::moved(path.clone(), path.clone())
                    };
                    inner.bus.dispatch_event(&event);
                }
            }
            RenameMode::To => {
                for path in paths {
                    if !inner.is_watched(path) {
                        continue;
                    }
                    let checksum = compute_checksum(path).ok();
                    let event = {
                        let mut state = inner.state.lock().unwrap();
                        let Some(file) = state.files.get_mut(path) else {
                            continue;
                        };
                        file.checksum = checksum;
                        ConfigChangeEvent {
                            kind: ConfigChangeKind::Moved,
                            path: path.clone(),
                            old_path: None,
                            checksum: None,
                            timestamp: Utc::now(),
                        }
                    };
                    inner.bus.dispatch_event(&event);
                }
            }
            // 平台未区分重命名方向时按存在性退化处理
            _ => {
                for path in paths {
                    if path.exists() {
                        Self::on_modified(inner, path);
                    } else {
                        inner.on_removed(path);
                    }
                }
            }
        }
    }

    /// 把路径放入所在目录的待分发集合并确保定时器在运行
    ///
    /// 同一路径只有一个槽位：时间戳和校验和被覆盖，不会排队出
    /// 两个竞争的事件；窗口内先Created后Modified保留Created语义
    fn mark_pending(
        inner: &Arc<Self>,
        state: &mut WatchState,
        path: &Path,
        kind: ConfigChangeKind,
        checksum: Option<String>,
    ) {
        let dir = parent_dir(path);
        let Some(entry) = state.directories.get_mut(&dir) else {
            return;
        };

        match entry.pending.entry(path.to_path_buf()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if slot.kind != ConfigChangeKind::Created {
                    slot.kind = kind;
                }
                slot.checksum = checksum;
                slot.marked_at = Instant::now();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingChange {
                    kind,
                    checksum,
                    marked_at: Instant::now(),
                });
            }
        }

        Self::ensure_timer(inner, entry, dir);
    }

    /// 确保目录的防抖动定时任务在运行
    fn ensure_timer(inner: &Arc<Self>, entry: &mut DirectoryWatch, dir: PathBuf) {
        let timer_alive = entry
            .timer
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false);
        if timer_alive {
            return;
        }

        let handle = {
            let runtime = inner.runtime.lock().unwrap();
            runtime.clone().or_else(|| Handle::try_current().ok())
        };
        let Some(handle) = handle else {
            warn!(
                "缺少运行时句柄，目录 {} 的防抖动定时器未启动",
                dir.display()
            );
            return;
        };

        let task_inner = Arc::clone(inner);
        entry.timer = Some(handle.spawn(async move {
            loop {
                tokio::time::sleep(task_inner.debounce_delay).await;
                let (ready, still_pending) = task_inner.collect_ready(&dir);
                for event in ready {
                    task_inner.bus.dispatch_event(&event);
                }
                if !still_pending {
                    break;
                }
            }
        }));
    }

    /// 取出所在目录里等待时间已超过防抖动延迟的变更
    ///
    /// 仍有路径在等待时定时器重新调度；各文件独立防抖动
    fn collect_ready(&self, dir: &Path) -> (Vec<ConfigChangeEvent>, bool) {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.directories.get_mut(dir) else {
            return (Vec::new(), false);
        };

        let now = Instant::now();
        let delay = self.debounce_delay;
        let ready_paths: Vec<PathBuf> = entry
            .pending
            .iter()
            .filter(|(_, change)| now.duration_since(change.marked_at) >= delay)
            .map(|(path, _)| path.clone())
            .collect();

        let mut events = Vec::with_capacity(ready_paths.len());
        for path in ready_paths {
            if let Some(change) = entry.pending.remove(&path) {
                let event = match change.kind {
                    ConfigChangeKind::Created => ConfigChangeEvent::created(path, change.checksum),
                    _ => ConfigChangeEvent::modified(path, change.checksum),
                };
                events.push(event);
            }
        }

        let still_pending = !entry.pending.is_empty();
        if !still_pending {
            entry.timer = None;
        }
        (events, still_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::sleep;

    const TEST_DEBOUNCE: Duration = Duration::from_millis(100);

    fn test_bus() -> Arc<ConfigEventBus> {
        Arc::new(ConfigEventBus::new())
    }

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        canonical_watch_path(&path).unwrap()
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "config.toml", "x = 1");

        let watcher = ChecksumFileWatcher::with_bus(TEST_DEBOUNCE, test_bus());
        watcher.add(&path).await.unwrap();
        watcher.add(&path).await.unwrap();

        assert_eq!(watcher.watched_file_count(), 1);
        assert_eq!(watcher.watched_directory_count(), 1);
    }

    #[tokio::test]
    async fn test_add_missing_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let watcher = ChecksumFileWatcher::with_bus(TEST_DEBOUNCE, test_bus());

        watcher.add(dir.path().join("missing.toml")).await.unwrap();

        assert_eq!(watcher.watched_file_count(), 0);
        assert_eq!(watcher.watched_directory_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_tears_down_directory() {
        let dir = TempDir::new().unwrap();
        let path_a = write_file(&dir, "a.toml", "x = 1");
        let path_b = write_file(&dir, "b.toml", "x = 2");

        let watcher = ChecksumFileWatcher::with_bus(TEST_DEBOUNCE, test_bus());
        watcher.add(&path_a).await.unwrap();
        watcher.add(&path_b).await.unwrap();
        assert_eq!(watcher.watched_directory_count(), 1);

        watcher.remove(&path_a);
        assert_eq!(watcher.watched_file_count(), 1);
        assert_eq!(watcher.watched_directory_count(), 1);

        watcher.remove(&path_b);
        assert_eq!(watcher.watched_file_count(), 0);
        assert_eq!(watcher.watched_directory_count(), 0);
    }

    #[tokio::test]
    async fn test_start_without_files_is_noop() {
        let watcher = ChecksumFileWatcher::with_bus(TEST_DEBOUNCE, test_bus());
        watcher.start().unwrap();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_start_stop_restart() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "config.toml", "x = 1");

        let watcher = ChecksumFileWatcher::with_bus(TEST_DEBOUNCE, test_bus());
        watcher.add(&path).await.unwrap();

        watcher.start().unwrap();
        assert!(watcher.is_running());

        // 重复启动是空操作
        watcher.start().unwrap();
        assert!(watcher.is_running());

        watcher.stop();
        assert!(!watcher.is_running());

        watcher.start().unwrap();
        assert!(watcher.is_running());
    }

    #[tokio::test]
    async fn test_rapid_writes_coalesce_into_one_event() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "config.toml", "x = 0");
        let bus = test_bus();

        let watcher = ChecksumFileWatcher::with_bus(TEST_DEBOUNCE, Arc::clone(&bus));
        watcher.add(&path).await.unwrap();

        // 防抖动窗口内的连续真实变更合并为一个事件
        for i in 1..=4 {
            fs::write(&path, format!("x = {}", i)).unwrap();
            WatcherInner::on_modified(&watcher.inner, &path);
        }

        sleep(TEST_DEBOUNCE * 3).await;

        let events = bus.get_recent_events(None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ConfigChangeKind::Modified);
        assert_eq!(events[0].path, path);
        assert!(events[0].checksum.is_some());
    }

    #[tokio::test]
    async fn test_spaced_writes_produce_separate_events() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "config.toml", "x = 0");
        let bus = test_bus();

        let watcher = ChecksumFileWatcher::with_bus(TEST_DEBOUNCE, Arc::clone(&bus));
        watcher.add(&path).await.unwrap();

        fs::write(&path, "x = 1").unwrap();
        WatcherInner::on_modified(&watcher.inner, &path);
        sleep(TEST_DEBOUNCE * 3).await;

        fs::write(&path, "x = 2").unwrap();
        WatcherInner::on_modified(&watcher.inner, &path);
        sleep(TEST_DEBOUNCE * 3).await;

        let events = bus.get_recent_events(None);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == ConfigChangeKind::Modified));
    }

    #[tokio::test]
    async fn test_unchanged_content_is_suppressed() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "config.toml", "x = 1");
        let bus = test_bus();

        let watcher = ChecksumFileWatcher::with_bus(TEST_DEBOUNCE, Arc::clone(&bus));
        watcher.add(&path).await.unwrap();

        // 内容未变的通知（例如mtime触碰）不产生事件
        WatcherInner::on_modified(&watcher.inner, &path);
        WatcherInner::on_modified(&watcher.inner, &path);

        sleep(TEST_DEBOUNCE * 3).await;

        assert!(bus.get_recent_events(None).is_empty());
    }

    #[tokio::test]
    async fn test_independent_files_debounce_independently() {
        let dir = TempDir::new().unwrap();
        let path_a = write_file(&dir, "a.toml", "x = 0");
        let path_b = write_file(&dir, "b.toml", "y = 0");
        let bus = test_bus();

        let watcher = ChecksumFileWatcher::with_bus(TEST_DEBOUNCE, Arc::clone(&bus));
        watcher.add(&path_a).await.unwrap();
        watcher.add(&path_b).await.unwrap();

        fs::write(&path_a, "x = 1").unwrap();
        WatcherInner::on_modified(&watcher.inner, &path_a);
        fs::write(&path_b, "y = 1").unwrap();
        WatcherInner::on_modified(&watcher.inner, &path_b);

        sleep(TEST_DEBOUNCE * 3).await;

        let events = bus.get_recent_events(None);
        assert_eq!(events.len(), 2);
        let paths: Vec<_> = events.iter().map(|e| e.path.clone()).collect();
        assert!(paths.contains(&path_a));
        assert!(paths.contains(&path_b));
    }

    #[tokio::test]
    async fn test_unwatched_paths_are_rejected() {
        let dir = TempDir::new().unwrap();
        let watched = write_file(&dir, "watched.toml", "x = 0");
        let unwatched = write_file(&dir, "unwatched.toml", "y = 0");
        let bus = test_bus();

        let watcher = ChecksumFileWatcher::with_bus(TEST_DEBOUNCE, Arc::clone(&bus));
        watcher.add(&watched).await.unwrap();

        fs::write(&unwatched, "y = 1").unwrap();
        WatcherInner::on_modified(&watcher.inner, &unwatched);

        sleep(TEST_DEBOUNCE * 3).await;

        assert!(bus.get_recent_events(None).is_empty());
    }

    #[tokio::test]
    async fn test_delete_dispatches_immediately_and_clears_baseline() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "config.toml", "x = 1");
        let bus = test_bus();

        let watcher = ChecksumFileWatcher::with_bus(TEST_DEBOUNCE, Arc::clone(&bus));
        watcher.add(&path).await.unwrap();

        fs::remove_file(&path).unwrap();
        watcher.inner.on_removed(&path);

        // 删除事件不经过防抖动窗口
        let events = bus.get_recent_events(None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ConfigChangeKind::Deleted);

        // 重建文件后Created事件重新建立基线
        fs::write(&path, "x = 1").unwrap();
        WatcherInner::on_created(&watcher.inner, &path);
        sleep(TEST_DEBOUNCE * 3).await;

        let events = bus.get_recent_events(None);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ConfigChangeKind::Created);
        assert!(events[0].checksum.is_some());
    }

    #[tokio::test]
    async fn test_created_kind_survives_followup_modification() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "config.toml", "x = 1");
        let bus = test_bus();

        let watcher = ChecksumFileWatcher::with_bus(TEST_DEBOUNCE, Arc::clone(&bus));
        watcher.add(&path).await.unwrap();

        WatcherInner::on_created(&watcher.inner, &path);
        fs::write(&path, "x = 2").unwrap();
        WatcherInner::on_modified(&watcher.inner, &path);

        sleep(TEST_DEBOUNCE * 3).await;

        let events = bus.get_recent_events(None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ConfigChangeKind::Created);
    }

    #[test]
    fn test_checksum_is_stable_hex() {
        let sum_a = checksum_bytes(b"hello");
        let sum_b = checksum_bytes(b"hello");
        let sum_c = checksum_bytes(b"world");

        assert_eq!(sum_a, sum_b);
        assert_ne!(sum_a, sum_c);
        assert_eq!(sum_a.len(), 64);
    }
}
