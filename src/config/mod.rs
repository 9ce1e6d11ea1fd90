//! 配置管理模块
//!
//! 提供配置文件解析、校验和去重的文件监控、事件分发、
//! 快照回滚和热重载功能

pub mod bus;
pub mod events;
pub mod loader;
pub mod manager;
pub mod overrides;
pub mod snapshot;
pub mod types;
pub mod watcher;

// 重新导出主要类型
pub use bus::{
    default_event_bus, reset_default_event_bus, ConfigEventBus, HandlerId,
    DEFAULT_RECENT_CAPACITY,
};
pub use events::{ConfigChangeEvent, ConfigChangeKind};
pub use loader::{
    config_from_document, config_to_document, get_default_config_path, ConfigLoader,
    TomlConfigLoader,
};
pub use manager::ConfigLifecycleManager;
pub use overrides::{is_valid_override_path, OverrideMap};
pub use snapshot::{ConfigSnapshot, ConfigSnapshotStore, MAX_SNAPSHOTS};
pub use types::{validate_config, Config, GeneralConfig, LlmConfig, WorkflowConfig};
pub use watcher::{ChecksumFileWatcher, DEFAULT_DEBOUNCE_DELAY};
