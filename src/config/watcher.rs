//! # 配置文件监控模块
//!
//! 实现配置文件的热重载：文件被写入或重新创建时重新读取，
//! 成功后把新配置交给启动时注册的回调。重载失败只记录日志，
//! 继续使用上一次成功加载的配置。

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{ProxyConfig, load_config};

/// 等待写入完成的时间
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// 配置变更回调
pub type ChangeCallback = Arc<dyn Fn(&ProxyConfig) + Send + Sync>;

/// 配置变更事件
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// 配置重载成功
    Reloaded(Arc<ProxyConfig>),
    /// 配置重载失败
    ReloadFailed(String),
    /// 配置文件被删除
    FileDeleted,
}

/// 配置监控器
pub struct ConfigWatcher {
    /// 配置文件路径
    config_path: PathBuf,
    /// 变更回调
    on_change: ChangeCallback,
    /// 事件发送器
    event_sender: broadcast::Sender<ConfigEvent>,
    /// 文件监控器
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// 创建新的配置监控器并开始监控
    pub fn new<F>(config_path: impl AsRef<Path>, on_change: F) -> crate::error::Result<Self>
    where
        F: Fn(&ProxyConfig) + Send + Sync + 'static,
    {
        let config_path = config_path.as_ref().to_path_buf();
        let on_change: ChangeCallback = Arc::new(on_change);

        let (event_sender, _) = broadcast::channel(64);

        let callback_clone = Arc::clone(&on_change);
        let sender_clone = event_sender.clone();
        let path_clone = config_path.clone();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    Self::handle_file_event(&event, &path_clone, &callback_clone, &sender_clone);
                }
                Err(e) => {
                    error!("文件监控错误: {}", e);
                }
            })?;

        // 监控配置文件所在目录，编辑器常用"写临时文件再改名"的方式保存
        let config_dir = watch_dir(&config_path);
        watcher.watch(&config_dir, RecursiveMode::NonRecursive)?;

        info!("配置文件监控器已启动: {:?}", config_path);

        Ok(Self {
            config_path,
            on_change,
            event_sender,
            _watcher: watcher,
        })
    }

    /// 订阅配置变更事件
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.event_sender.subscribe()
    }

    /// 手动重载配置
    pub fn reload(&self) -> crate::error::Result<()> {
        match load_config(&self.config_path) {
            Ok(new_config) => {
                apply(&new_config, &self.on_change, &self.event_sender);
                Ok(())
            }
            Err(e) => {
                let error_msg = format!("配置重载失败: {e}");
                warn!("{}", error_msg);
                let _ = self
                    .event_sender
                    .send(ConfigEvent::ReloadFailed(error_msg));
                Err(e)
            }
        }
    }

    /// 处理文件变更事件
    fn handle_file_event(
        event: &Event,
        config_path: &Path,
        on_change: &ChangeCallback,
        sender: &broadcast::Sender<ConfigEvent>,
    ) {
        // 只处理我们关心的配置文件
        let is_our_file = event
            .paths
            .iter()
            .any(|path| path.file_name() == config_path.file_name());

        if !is_our_file {
            return;
        }

        match &event.kind {
            EventKind::Modify(_) | EventKind::Create(_) => {
                debug!("检测到配置文件变更: {:?}", event.paths);

                // 等待一小段时间，确保文件写入完成
                std::thread::sleep(SETTLE_DELAY);

                match load_config(config_path) {
                    Ok(new_config) => apply(&new_config, on_change, sender),
                    Err(e) => {
                        let error_msg = format!("配置文件重载失败，继续使用上一次的配置: {e}");
                        warn!("{}", error_msg);
                        let _ = sender.send(ConfigEvent::ReloadFailed(error_msg));
                    }
                }
            }
            EventKind::Remove(_) => {
                warn!("配置文件被删除: {:?}", event.paths);
                let _ = sender.send(ConfigEvent::FileDeleted);
            }
            _ => {
                // 忽略其他事件类型
            }
        }
    }
}

/// 把新配置交给回调并广播
fn apply(
    new_config: &ProxyConfig,
    on_change: &ChangeCallback,
    sender: &broadcast::Sender<ConfigEvent>,
) {
    on_change(new_config);
    let _ = sender.send(ConfigEvent::Reloaded(Arc::new(new_config.clone())));
    info!(users = new_config.users.len(), "配置文件热重载成功");
}

/// 配置文件所在目录，裸文件名对应当前目录
fn watch_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
