//! 配置生命周期管理器
//!
//! 持有单个配置文件"当前配置"的唯一权威副本，编排
//! 加载 → 验证 → 应用 → 快照 → 覆盖层重放的完整流程以及回滚；
//! 全部操作由实例内的一把锁串行化

use crate::config::bus::{default_event_bus, ConfigEventBus, HandlerId};
use crate::config::loader::{
    config_from_document, config_to_document, ConfigLoader, TomlConfigLoader,
};
use crate::config::overrides::{apply_override, is_valid_override_path, OverrideMap};
use crate::config::snapshot::{ConfigSnapshot, ConfigSnapshotStore};
use crate::config::types::Config;
use crate::config::watcher::canonical_watch_path;
use crate::error::{ReloadError, Result, ValidationError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 单个被管理文件的生命周期状态
struct LifecycleState {
    /// 当前配置（基线叠加覆盖层之后的结果）
    current: Config,
    /// 覆盖表
    overrides: OverrideMap,
    /// 有界快照历史
    snapshots: ConfigSnapshotStore,
    /// 成功的重载/回滚次数，单调递增
    reload_count: u64,
}

/// 配置生命周期管理器
///
/// 一个实例管理一个配置文件，多个实例彼此完全独立。变更操作
/// 要么完整成功，要么保持原状态并向调用方返回错误，不存在
/// 半应用的中间状态
pub struct ConfigLifecycleManager {
    config_path: PathBuf,
    loader: TomlConfigLoader,
    bus: Arc<ConfigEventBus>,
    state: Mutex<LifecycleState>,
    /// 注册在总线上的日志处理器凭据，dispose时注销
    handler_id: StdMutex<Option<HandlerId>>,
    disposed: AtomicBool,
}

impl ConfigLifecycleManager {
    /// 创建使用默认事件总线的管理器
    ///
    /// 执行与 [`reload`](Self::reload) 相同的加载+验证路径，
    /// 成功后写入首个快照；文件缺失或无效时构造失败
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(path.as_ref().to_path_buf(), None, default_event_bus()).await
    }

    /// 创建使用指定事件总线的管理器
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    /// * `bus` - 注册变更处理器的事件总线
    pub async fn with_bus<P: AsRef<Path>>(path: P, bus: Arc<ConfigEventBus>) -> Result<Self> {
        Self::build(path.as_ref().to_path_buf(), None, bus).await
    }

    /// 用预加载的配置创建管理器，跳过初始的文件加载
    ///
    /// # 参数
    /// * `path` - 配置文件路径（供后续重载使用）
    /// * `initial_config` - 预加载的配置，仍要通过验证
    /// * `bus` - 注册变更处理器的事件总线
    pub async fn with_initial_config<P: AsRef<Path>>(
        path: P,
        initial_config: Config,
        bus: Arc<ConfigEventBus>,
    ) -> Result<Self> {
        Self::build(path.as_ref().to_path_buf(), Some(initial_config), bus).await
    }

    async fn build(path: PathBuf, initial: Option<Config>, bus: Arc<ConfigEventBus>) -> Result<Self> {
        let config_path = canonical_watch_path(&path).unwrap_or(path);
        let loader = TomlConfigLoader::new(true);

        let config = match initial {
            Some(config) => {
                // 预加载的配置同样要通过验证，构造绝不产出半可用的管理器
                loader.validate(&config)?;
                config
            }
            None => loader.load_from_file(&config_path).await?,
        };

        let overrides = OverrideMap::new();
        let mut snapshots = ConfigSnapshotStore::new();
        snapshots.push(&config, &overrides);

        // 目前注册的处理器只记录日志；由变更事件自动触发重载
        // 是计划中的扩展
        let watched = config_path.clone();
        let handler_id = bus.register_handler(
            move |event| {
                if event.path == watched {
                    info!(
                        "检测到配置文件变更: {} ({})",
                        event.path.display(),
                        event.kind
                    );
                }
                Ok(())
            },
            None,
        );

        info!("配置管理器就绪: {}", config_path.display());
        Ok(Self {
            config_path,
            loader,
            bus,
            state: Mutex::new(LifecycleState {
                current: config,
                overrides,
                snapshots,
                reload_count: 0,
            }),
            handler_id: StdMutex::new(Some(handler_id)),
            disposed: AtomicBool::new(false),
        })
    }

    /// 被管理的配置文件路径
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 当前配置的副本
    pub async fn current_config(&self) -> Config {
        self.state.lock().await.current.clone()
    }

    /// 成功的重载/回滚次数
    pub async fn reload_count(&self) -> u64 {
        self.state.lock().await.reload_count
    }

    /// 当前覆盖表的副本
    pub async fn get_overrides(&self) -> OverrideMap {
        self.state.lock().await.overrides.clone()
    }

    /// 设置覆盖项，叠加在当前配置之上
    ///
    /// 语法无效的点路径被记录并跳过，不中断整批；每个合法项
    /// 独立地应用并重新验证，失败的单项被丢弃。存活的覆盖项
    /// 立即生效并在后续重载中保持
    ///
    /// # 参数
    /// * `overrides` - `点路径 -> 字符串值` 对的有序列表
    pub async fn set_overrides(
        &self,
        overrides: Vec<(String, String)>,
    ) -> std::result::Result<(), ReloadError> {
        self.ensure_active()?;
        let mut guard = self.state.lock().await;
        let state: &mut LifecycleState = &mut guard;

        let mut accepted = state.overrides.clone();
        for (path, value) in overrides {
            if !is_valid_override_path(&path) {
                warn!("覆盖路径语法无效: {}，该项被跳过", path);
                continue;
            }
            accepted.insert(path, value);
        }

        let (applied, surviving) = reapply_overrides(&state.current, &accepted);
        state.current = applied;
        state.overrides = surviving;
        Ok(())
    }

    /// 只验证不应用：加载并验证配置文件，不修改任何状态
    ///
    /// # 返回
    /// * `Result<Config, ValidationError>` - 验证通过的配置或验证错误
    pub async fn validate(&self) -> std::result::Result<Config, ValidationError> {
        // 与其他操作串行，但作为纯读取不触碰状态
        let _guard = self.state.lock().await;
        self.loader.load_from_file(&self.config_path).await
    }

    /// 重新加载配置文件
    ///
    /// 成功时原子地替换当前配置、递增计数、写入重载后状态与
    /// 当时覆盖表的快照，然后把每个覆盖项重放到新基线（单项
    /// 失败只记录日志，不撤销重载）。失败时返回包装原因的
    /// [`ReloadError`]，状态保持原样
    pub async fn reload(&self) -> std::result::Result<Config, ReloadError> {
        self.ensure_active()?;
        let mut guard = self.state.lock().await;
        let state: &mut LifecycleState = &mut guard;

        // 唯一可失败的步骤先行，之后的提交不再失败
        let loaded = self
            .loader
            .load_from_file(&self.config_path)
            .await
            .map_err(ReloadError::Validation)?;

        state.current = loaded;
        state.reload_count += 1;
        state.snapshots.push(&state.current, &state.overrides);

        let (applied, surviving) = reapply_overrides(&state.current, &state.overrides);
        state.current = applied;
        state.overrides = surviving;

        info!(
            "配置重载成功: {}，累计第 {} 次变更",
            self.config_path.display(),
            state.reload_count
        );
        Ok(state.current.clone())
    }

    /// 回滚到快照历史中的较早状态
    ///
    /// 恢复快照中的配置与覆盖表（覆盖项按
    /// [`set_overrides`](Self::set_overrides) 的规则重新验证），
    /// 历史被截断到恢复点，计数递增。`steps` 不小于可用历史时
    /// 返回 [`ReloadError`]，状态保持原样
    ///
    /// # 参数
    /// * `steps` - 从最近快照回退的步数
    pub async fn rollback(&self, steps: usize) -> std::result::Result<Config, ReloadError> {
        self.ensure_active()?;
        let mut guard = self.state.lock().await;
        let state: &mut LifecycleState = &mut guard;

        let Some(target) = state.snapshots.target(steps) else {
            return Err(ReloadError::HistoryExhausted {
                steps,
                available: state.snapshots.len(),
            });
        };

        // 先在快照副本上算出恢复结果，成功后才提交截断
        let base = target.config.clone();
        let target_overrides = target.overrides.clone();
        let (restored, surviving) = reapply_overrides(&base, &target_overrides);

        state.snapshots.truncate_to_target(steps);
        state.current = restored;
        state.overrides = surviving;
        state.reload_count += 1;

        info!(
            "配置回滚成功: 回退 {} 步，累计第 {} 次变更",
            steps, state.reload_count
        );
        Ok(state.current.clone())
    }

    /// 快照历史的副本，最旧的在前
    pub async fn get_snapshots(&self) -> Vec<ConfigSnapshot> {
        self.state.lock().await.snapshots.snapshots().to_vec()
    }

    /// 清除快照历史，只保留当前快照
    pub async fn clear_snapshots(&self) {
        self.state.lock().await.snapshots.clear_keep_latest();
    }

    /// 释放管理器：注销总线上的变更处理器
    ///
    /// 幂等，可在任何退出路径（包括异常展开）上安全调用；
    /// 释放后变更操作返回 [`ReloadError::Disposed`]
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handler = self.handler_id.lock().unwrap().take();
        if let Some(id) = handler {
            self.bus.unregister_handler(id);
        }
        info!("配置管理器已释放: {}", self.config_path.display());
    }

    /// 管理器是否已释放
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> std::result::Result<(), ReloadError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ReloadError::Disposed);
        }
        Ok(())
    }
}

impl Drop for ConfigLifecycleManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// 把覆盖表逐项重放到基线配置上
///
/// 每一项独立地应用并重新验证：失败的项记录日志后丢弃，
/// 不影响其余项，也绝不向调用方抛出。返回应用后的配置和
/// 存活的覆盖表
fn reapply_overrides(base: &Config, overrides: &OverrideMap) -> (Config, OverrideMap) {
    if overrides.is_empty() {
        return (base.clone(), OverrideMap::new());
    }

    let mut document = match config_to_document(base) {
        Ok(document) => document,
        Err(e) => {
            warn!("配置转换为文档失败: {}，覆盖层未应用", e);
            return (base.clone(), OverrideMap::new());
        }
    };

    let mut current = base.clone();
    let mut surviving = OverrideMap::new();

    for (path, value) in overrides.iter() {
        let mut candidate = document.clone();
        if let Err(e) = apply_override(&mut candidate, path, value) {
            warn!("应用覆盖项 {} 失败: {}，该项被丢弃", path, e);
            continue;
        }
        match config_from_document(candidate.clone()) {
            Ok(config) => {
                document = candidate;
                current = config;
                surviving.insert(path.to_string(), value.to_string());
            }
            Err(e) => {
                warn!("覆盖项 {}={} 未通过重新验证: {}，该项被丢弃", path, value, e);
            }
        }
    }

    (current, surviving)
}
