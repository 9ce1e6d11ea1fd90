//! 配置热重载端到端测试
//!
//! 走完整的真实链路：文件系统通知 → 校验和/防抖动 → 事件总线 →
//! 管理器重载

use config_pulse::config::{
    ChecksumFileWatcher, ConfigChangeKind, ConfigEventBus, ConfigLifecycleManager,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::time::sleep;

const DEBOUNCE: Duration = Duration::from_millis(200);
const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn workflow_toml(temperature: f64) -> String {
    format!(
        r#"
[general]
log_level = "info"

[llms.nim_llm]
model = "meta/llama-3.1-70b-instruct"
temperature = {:.1}

[workflow]
entry = "react_agent"
llm = "nim_llm"
"#,
        temperature
    )
}

/// 轮询总线直到累计事件数达到期望值或超时
async fn wait_for_events(bus: &ConfigEventBus, expected: usize) -> bool {
    let start = Instant::now();
    while start.elapsed() < EVENT_TIMEOUT {
        if bus.get_recent_events(None).len() >= expected {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watch_then_reload_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("workflow.toml");
    fs::write(&path, workflow_toml(0.7)).unwrap();
    let canonical: PathBuf = path.canonicalize().unwrap();

    let bus = Arc::new(ConfigEventBus::new());
    let watcher = ChecksumFileWatcher::with_bus(DEBOUNCE, Arc::clone(&bus));
    watcher.add(&path).await.unwrap();
    watcher.start().unwrap();
    assert!(watcher.is_running());

    let manager = ConfigLifecycleManager::with_bus(&path, Arc::clone(&bus))
        .await
        .unwrap();
    assert_eq!(
        manager.current_config().await.llms["nim_llm"].temperature,
        0.7
    );

    // 重写相同内容：校验和未变，不产生事件
    fs::write(&path, workflow_toml(0.7)).unwrap();
    sleep(DEBOUNCE * 4).await;
    assert!(bus.get_recent_events(None).is_empty());

    // 真实变更：防抖动窗口后恰好一个Modified事件
    fs::write(&path, workflow_toml(0.2)).unwrap();
    assert!(wait_for_events(&bus, 1).await);
    sleep(DEBOUNCE * 2).await;

    let events = bus.get_recent_events(None);
    let modified: Vec<_> = events
        .iter()
        .filter(|e| e.kind == ConfigChangeKind::Modified)
        .collect();
    assert_eq!(modified.len(), 1);
    assert_eq!(modified[0].path, canonical);
    assert!(modified[0].checksum.is_some());

    // 管理器重载拿到新内容
    let reloaded = manager.reload().await.unwrap();
    assert_eq!(reloaded.llms["nim_llm"].temperature, 0.2);
    assert_eq!(manager.reload_count().await, 1);

    watcher.stop();
    assert!(!watcher.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_then_recreate_rebaselines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("workflow.toml");
    let content = workflow_toml(0.7);
    fs::write(&path, &content).unwrap();

    let bus = Arc::new(ConfigEventBus::new());
    let watcher = ChecksumFileWatcher::with_bus(DEBOUNCE, Arc::clone(&bus));
    watcher.add(&path).await.unwrap();
    watcher.start().unwrap();

    // 删除立即分发，不经过防抖动窗口
    fs::remove_file(&path).unwrap();
    assert!(wait_for_events(&bus, 1).await);
    let events = bus.get_recent_events(None);
    assert!(events
        .iter()
        .any(|e| e.kind == ConfigChangeKind::Deleted));

    // 以相同内容重建：基线已清除，Created事件照常产生
    bus.clear_recent_events();
    fs::write(&path, &content).unwrap();
    assert!(wait_for_events(&bus, 1).await);
    sleep(DEBOUNCE * 2).await;

    let events = bus.get_recent_events(None);
    let created: Vec<_> = events
        .iter()
        .filter(|e| e.kind == ConfigChangeKind::Created)
        .collect();
    assert_eq!(created.len(), 1);
    assert!(created[0].checksum.is_some());

    // 重建后的基线生效：再次写入相同内容被抑制
    bus.clear_recent_events();
    fs::write(&path, &content).unwrap();
    sleep(DEBOUNCE * 4).await;
    assert!(bus.get_recent_events(None).is_empty());

    watcher.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reload_rollback_cycle_with_live_watcher() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("workflow.toml");
    fs::write(&path, workflow_toml(0.7)).unwrap();

    let bus = Arc::new(ConfigEventBus::new());
    let watcher = ChecksumFileWatcher::with_bus(DEBOUNCE, Arc::clone(&bus));
    watcher.add(&path).await.unwrap();
    watcher.start().unwrap();

    let manager = ConfigLifecycleManager::with_bus(&path, Arc::clone(&bus))
        .await
        .unwrap();
    manager
        .set_overrides(vec![(
            "general.log_level".to_string(),
            "debug".to_string(),
        )])
        .await
        .unwrap();

    fs::write(&path, workflow_toml(0.2)).unwrap();
    assert!(wait_for_events(&bus, 1).await);

    let reloaded = manager.reload().await.unwrap();
    assert_eq!(reloaded.llms["nim_llm"].temperature, 0.2);
    // 覆盖项在重载后依然生效
    assert_eq!(reloaded.general.log_level, "debug");

    let restored = manager.rollback(1).await.unwrap();
    assert_eq!(restored.llms["nim_llm"].temperature, 0.7);
    assert_eq!(manager.reload_count().await, 2);

    manager.dispose();
    watcher.stop();
}
