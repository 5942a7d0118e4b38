//! # 应用配置结构定义

use serde::{Deserialize, Serialize};

use crate::ensure_config;
use crate::error::Result;
use crate::proxy::UpstreamCredentials;

/// 未配置端口时的默认监听端口
pub const DEFAULT_BIND_PORT: u16 = 80;

/// 应用主配置结构（对应 `config.toml`）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// 允许访问的调用方令牌
    #[serde(default)]
    pub users: Vec<String>,
    /// 监听端口，可写作 `8080` 或 `":8080"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSetting>,
    /// 上游令牌
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// 上游组织ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
}

/// 端口配置，兼容整数与字符串两种写法
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSetting {
    /// `port = 8080`
    Number(u16),
    /// `port = ":8080"`
    Text(String),
}

impl PortSetting {
    /// 解析为端口号，空字符串视为未配置
    pub fn resolve(&self) -> Result<Option<u16>> {
        match self {
            Self::Number(port) => {
                ensure_config!(*port != 0, "无效的监听端口: 0");
                Ok(Some(*port))
            }
            Self::Text(text) => parse_port(text),
        }
    }
}

impl ProxyConfig {
    /// 当前配置中的上游凭据
    #[must_use]
    pub fn credentials(&self) -> UpstreamCredentials {
        UpstreamCredentials::new(self.token.clone(), self.org.clone())
    }

    /// 配置文件中的端口
    pub fn configured_port(&self) -> Result<Option<u16>> {
        self.port.as_ref().map_or(Ok(None), PortSetting::resolve)
    }
}

/// 解析 `"8080"` / `":8080"` 形式的端口，空字符串返回 `None`
pub fn parse_port(raw: &str) -> Result<Option<u16>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let digits = trimmed.strip_prefix(':').unwrap_or(trimmed);
    let port: u16 = digits.parse().map_err(|e| {
        crate::error::ProxyError::config_with_source(format!("无效的监听端口: {raw}"), e)
    })?;
    ensure_config!(port != 0, "无效的监听端口: {}", raw);

    Ok(Some(port))
}

/// 决定最终监听端口
///
/// 优先级：环境变量 `BIND_PORT` > 配置文件 `port` > 默认 80
pub fn resolve_bind_port(env_port: Option<&str>, config: &ProxyConfig) -> Result<u16> {
    if let Some(port) = env_port.map(parse_port).transpose()?.flatten() {
        return Ok(port);
    }

    Ok(config.configured_port()?.unwrap_or(DEFAULT_BIND_PORT))
}
