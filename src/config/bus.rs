//! 配置事件总线
//!
//! 提供按类型过滤的发布/订阅分发、处理器故障隔离和有界的
//! 最近事件缓冲

use crate::config::events::{ConfigChangeEvent, ConfigChangeKind};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, error};

/// 最近事件缓冲的默认容量
pub const DEFAULT_RECENT_CAPACITY: usize = 100;

/// 事件处理器类型
///
/// 返回 `Err` 表示处理失败，由总线记录日志，绝不向分发方传播
pub type EventHandler = Arc<dyn Fn(&ConfigChangeEvent) -> anyhow::Result<()> + Send + Sync>;

/// 处理器注册凭据
///
/// Rust闭包没有可用的相等性，注销以注册时返回的凭据为准；
/// 同一个闭包可以多次注册，各自持有独立凭据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// 单个处理器的注册记录
struct HandlerRegistration {
    id: HandlerId,
    /// 过滤的变更类型，`None` 表示接收全部类型
    kind: Option<ConfigChangeKind>,
    handler: EventHandler,
}

/// 配置事件总线
///
/// 处理器注册表和最近事件缓冲是子系统中仅有的、在没有管理器
/// 锁保护下被多线程访问的状态：分发运行在监控器的通知线程上，
/// 注册/注销可能来自任意线程（包括测试清理），因此二者都由
/// 内部互斥锁保护
pub struct ConfigEventBus {
    handlers: Mutex<Vec<HandlerRegistration>>,
    recent: Mutex<VecDeque<ConfigChangeEvent>>,
    recent_capacity: usize,
    next_id: AtomicU64,
}

impl ConfigEventBus {
    /// 创建默认容量的事件总线
    pub fn new() -> Self {
        Self::with_recent_capacity(DEFAULT_RECENT_CAPACITY)
    }

    /// 创建指定最近事件容量的事件总线
    ///
    /// # 参数
    /// * `recent_capacity` - 最近事件缓冲容量，至少为1
    pub fn with_recent_capacity(recent_capacity: usize) -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            recent: Mutex::new(VecDeque::new()),
            recent_capacity: recent_capacity.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// 注册事件处理器
    ///
    /// # 参数
    /// * `handler` - 处理器回调
    /// * `kind` - 过滤的变更类型，`None` 表示接收全部类型
    ///
    /// # 返回
    /// * `HandlerId` - 注销时使用的凭据
    pub fn register_handler<F>(&self, handler: F, kind: Option<ConfigChangeKind>) -> HandlerId
    where
        F: Fn(&ConfigChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.lock().unwrap();
        handlers.push(HandlerRegistration {
            id,
            kind,
            handler: Arc::new(handler),
        });
        debug!("注册事件处理器 {:?}，过滤类型: {:?}", id, kind);
        id
    }

    /// 注销事件处理器
    ///
    /// # 参数
    /// * `id` - 注册时返回的凭据
    ///
    /// # 返回
    /// * `bool` - 是否找到并移除了对应的处理器
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock().unwrap();
        let before = handlers.len();
        handlers.retain(|registration| registration.id != id);
        let removed = handlers.len() < before;
        if removed {
            debug!("注销事件处理器 {:?}", id);
        }
        removed
    }

    /// 分发一个配置变更事件
    ///
    /// 按注册顺序先调用类型匹配的处理器，再调用全局处理器；
    /// 每次调用都被隔离，处理器返回错误或panic只记录日志，
    /// 不影响后续处理器，也不向调用方传播
    ///
    /// # 参数
    /// * `event` - 要分发的事件
    pub fn dispatch_event(&self, event: &ConfigChangeEvent) {
        // 先记录到最近事件缓冲，处理器故障不会丢失记录
        {
            let mut recent = self.recent.lock().unwrap();
            recent.push_back(event.clone());
            while recent.len() > self.recent_capacity {
                recent.pop_front();
            }
        }

        // 在锁外调用处理器，注册表只在收集阶段被短暂锁定
        let targets: Vec<EventHandler> = {
            let handlers = self.handlers.lock().unwrap();
            let specific = handlers
                .iter()
                .filter(|r| r.kind == Some(event.kind))
                .map(|r| Arc::clone(&r.handler));
            let global = handlers
                .iter()
                .filter(|r| r.kind.is_none())
                .map(|r| Arc::clone(&r.handler));
            specific.chain(global).collect()
        };

        debug!(
            "分发配置变更事件: {} {}，处理器数量: {}",
            event.kind,
            event.path.display(),
            targets.len()
        );

        for handler in targets {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("事件处理器执行失败: {}", e);
                }
                Err(_) => {
                    error!("事件处理器发生panic，已隔离");
                }
            }
        }
    }

    /// 获取最近分发的事件，最新的在前
    ///
    /// # 参数
    /// * `limit` - 返回数量上限，`None` 表示全部
    pub fn get_recent_events(&self, limit: Option<usize>) -> Vec<ConfigChangeEvent> {
        let recent = self.recent.lock().unwrap();
        let take = limit.unwrap_or(recent.len());
        recent.iter().rev().take(take).cloned().collect()
    }

    /// 清空最近事件缓冲
    pub fn clear_recent_events(&self) {
        self.recent.lock().unwrap().clear();
    }

    /// 统计处理器数量
    ///
    /// # 参数
    /// * `kind` - `None` 统计全部注册；`Some(kind)` 只统计按该
    ///   类型过滤注册的处理器（不含全局处理器）
    pub fn handler_count(&self, kind: Option<ConfigChangeKind>) -> usize {
        let handlers = self.handlers.lock().unwrap();
        match kind {
            None => handlers.len(),
            Some(k) => handlers.iter().filter(|r| r.kind == Some(k)).count(),
        }
    }
}

impl Default for ConfigEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// 进程级默认事件总线槽位
static DEFAULT_BUS: OnceLock<Mutex<Option<Arc<ConfigEventBus>>>> = OnceLock::new();

fn default_bus_slot() -> &'static Mutex<Option<Arc<ConfigEventBus>>> {
    DEFAULT_BUS.get_or_init(|| Mutex::new(None))
}

/// 获取进程级默认事件总线，首次调用时惰性构造
///
/// 调用方应优先显式传递总线实例，只在最外层装配处回退到
/// 默认总线
pub fn default_event_bus() -> Arc<ConfigEventBus> {
    let mut slot = default_bus_slot().lock().unwrap();
    slot.get_or_insert_with(|| Arc::new(ConfigEventBus::new()))
        .clone()
}

/// 重置进程级默认事件总线
///
/// 仅用于测试隔离；已持有旧实例的调用方不受影响
pub fn reset_default_event_bus() {
    let mut slot = default_bus_slot().lock().unwrap();
    *slot = None;
}
