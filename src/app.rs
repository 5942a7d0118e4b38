//! # 应用装配
//!
//! 启动顺序：加载配置（失败即退出）→ 构建授权存储与上游目标 →
//! 决定监听端口 → 启动配置监控 → 开始服务。

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::AuthorizationStore;
use crate::config::{ConfigWatcher, DEFAULT_CONFIG_FILE, ProxyConfig, load_config, resolve_bind_port};
use crate::error::{Context, Result};
use crate::proxy::{ForwardingEngine, OPENAI_BASE_URL, ProxyServer, ProxyState, ProxyTarget};

/// 启动参数（来自命令行与环境变量）
#[derive(Debug, Clone)]
pub struct Settings {
    /// 配置文件路径
    pub config_path: PathBuf,
    /// `BIND_PORT` 环境变量
    pub bind_port: Option<String>,
    /// `PROXY_URL` 环境变量
    pub proxy_url: Option<String>,
    /// 上游基础地址
    pub upstream_base_url: String,
    /// 是否监控配置文件变更
    pub watch: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            bind_port: None,
            proxy_url: None,
            upstream_base_url: OPENAI_BASE_URL.to_string(),
            watch: true,
        }
    }
}

/// 装配完成、尚未开始服务的应用
pub struct Application {
    server: ProxyServer,
    store: Arc<AuthorizationStore>,
    target: Arc<ProxyTarget>,
    _watcher: Option<ConfigWatcher>,
}

impl Application {
    /// 按启动参数装配应用
    ///
    /// 启动阶段的任何错误（配置缺失或非法、端口非法、出站代理地址非法）都直接返回。
    pub fn bootstrap(settings: &Settings) -> Result<Self> {
        let config = load_config(&settings.config_path).with_context(|| {
            format!("启动时加载配置失败: {}", settings.config_path.display())
        })?;

        let store = Arc::new(AuthorizationStore::from_tokens(config.users.iter().cloned()));
        tracing::info!(users = store.len(), "授权列表已加载");

        let target = Arc::new(
            ProxyTarget::new(&settings.upstream_base_url, config.credentials())?
                .with_outbound_proxy(settings.proxy_url.as_deref())?,
        );
        let forwarder = Arc::new(ForwardingEngine::new(Arc::clone(&target))?);

        let port = resolve_bind_port(settings.bind_port.as_deref(), &config)?;
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

        let watcher = if settings.watch {
            Self::start_watcher(settings, &store, &target)
        } else {
            None
        };

        let state = ProxyState::new(Arc::clone(&store), forwarder);

        Ok(Self {
            server: ProxyServer::new(bind_addr, state),
            store,
            target,
            _watcher: watcher,
        })
    }

    /// 监听地址
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.server.bind_addr()
    }

    /// 授权存储
    #[must_use]
    pub fn store(&self) -> &Arc<AuthorizationStore> {
        &self.store
    }

    /// 上游目标
    #[must_use]
    pub fn target(&self) -> &Arc<ProxyTarget> {
        &self.target
    }

    /// 开始服务
    pub async fn run(self) -> Result<()> {
        self.server.run().await
    }

    /// 监控器启动失败不影响服务，只是失去热重载能力
    fn start_watcher(
        settings: &Settings,
        store: &Arc<AuthorizationStore>,
        target: &Arc<ProxyTarget>,
    ) -> Option<ConfigWatcher> {
        let store = Arc::clone(store);
        let target = Arc::clone(target);

        match ConfigWatcher::new(&settings.config_path, move |config| {
            apply_config(&store, &target, config);
        }) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!("配置文件监控启动失败，热重载已禁用: {}", e);
                None
            }
        }
    }
}

/// 应用重新加载的配置：授权列表一次性整体替换，上游凭据同步更新
///
/// 监听端口只在启动时生效，重载中的端口变化被忽略。
pub fn apply_config(store: &AuthorizationStore, target: &ProxyTarget, config: &ProxyConfig) {
    store.replace(config.users.iter().cloned());
    target.update_credentials(config.credentials());

    tracing::info!(users = store.len(), "授权列表与上游凭据已更新");
}
