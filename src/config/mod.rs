//! # 配置管理模块
//!
//! 处理配置文件加载、验证与热重载

mod app_config;
mod watcher;

pub use app_config::{DEFAULT_BIND_PORT, PortSetting, ProxyConfig, parse_port, resolve_bind_port};
pub use watcher::{ConfigEvent, ConfigWatcher};

use axum::http::HeaderValue;
use std::path::Path;

use crate::error::{Context, Result};

/// 默认配置文件（相对当前工作目录）
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// 加载并验证配置文件
pub fn load_config(path: impl AsRef<Path>) -> Result<ProxyConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(crate::config_error!("配置文件不存在: {}", path.display()));
    }

    let config_content = std::fs::read_to_string(path)
        .with_context(|| format!("读取配置文件失败: {}", path.display()))?;

    let config: ProxyConfig = toml::from_str(&config_content)
        .with_context(|| format!("TOML解析失败 - 配置文件: {}", path.display()))?;

    validate_config(&config)?;

    Ok(config)
}

/// 验证配置有效性
fn validate_config(config: &ProxyConfig) -> Result<()> {
    config.configured_port()?;

    // 凭据会被直接写进上游请求头，必须是合法的头部值
    if let Some(token) = config.credentials().token() {
        crate::ensure_config!(
            HeaderValue::from_str(&format!("{}{token}", crate::auth::TOKEN_PREFIX)).is_ok(),
            "上游 token 含有非法字符"
        );
    }
    if let Some(org) = config.credentials().org() {
        crate::ensure_config!(HeaderValue::from_str(org).is_ok(), "上游 org 含有非法字符");
    }

    if config.users.iter().any(String::is_empty) {
        tracing::warn!("users 中存在空令牌，空令牌永远不会通过授权");
    }

    Ok(())
}
