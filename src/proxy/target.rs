//! # 上游目标
//!
//! 固定的上游身份：协议与主机、可热更新的上游凭据，以及可选的出站代理。
//! 改写哪些请求头是固定的，只有凭据的值会随配置变化。

use axum::http::{
    HeaderValue, Uri,
    uri::{Authority, PathAndQuery, Scheme},
};
use std::sync::Arc;
use url::{Host, Url};

use crate::ensure_config;
use crate::error::{ProxyError, Result};
use crate::utils::SnapshotCell;

/// `OpenAI` 上游地址
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// 上游凭据（令牌与组织ID），空值视为未配置
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamCredentials {
    token: Option<String>,
    org: Option<String>,
}

impl UpstreamCredentials {
    /// 创建凭据，空字符串归一为 `None`
    #[must_use]
    pub fn new(token: Option<String>, org: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
            org: org.filter(|o| !o.is_empty()),
        }
    }

    /// 上游令牌
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// 上游组织ID
    #[must_use]
    pub fn org(&self) -> Option<&str> {
        self.org.as_deref()
    }
}

/// 上游目标
#[derive(Debug)]
pub struct ProxyTarget {
    scheme: Scheme,
    authority: Authority,
    path_prefix: String,
    host_header: HeaderValue,
    credentials: SnapshotCell<UpstreamCredentials>,
    outbound_proxy: Option<Url>,
}

impl ProxyTarget {
    /// 解析上游地址并创建目标，地址非法时返回配置错误
    pub fn new(base_url: &str, credentials: UpstreamCredentials) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;
        let host = host_header(&base_url)?;

        let scheme = Scheme::try_from(base_url.scheme()).map_err(|e| {
            ProxyError::config_with_source(format!("上游协议无效: {base_url}"), e)
        })?;
        let authority = Authority::try_from(host.as_str()).map_err(|e| {
            ProxyError::config_with_source(format!("上游 host 无效: {base_url}"), e)
        })?;
        let host_header = HeaderValue::from_str(&host).map_err(|e| {
            ProxyError::config_with_source(format!("上游 host 无法作为请求头: {base_url}"), e)
        })?;

        Ok(Self {
            scheme,
            authority,
            path_prefix: base_url.path().trim_end_matches('/').to_string(),
            host_header,
            credentials: SnapshotCell::new(credentials),
            outbound_proxy: None,
        })
    }

    /// 设置出站代理（来自 `PROXY_URL` 环境变量），空值表示直连
    pub fn with_outbound_proxy(mut self, proxy_url: Option<&str>) -> Result<Self> {
        self.outbound_proxy = match proxy_url.map(str::trim).filter(|p| !p.is_empty()) {
            Some(raw) => {
                let url = Url::parse(raw).map_err(|e| {
                    ProxyError::config_with_source(format!("无效的出站代理地址: {raw}"), e)
                })?;
                ensure_config!(
                    url.scheme() == "http" && url.host().is_some(),
                    "出站代理必须是带 host 的 http 地址: {}",
                    raw
                );
                Some(url)
            }
            None => None,
        };
        Ok(self)
    }

    /// 发往上游的 `Host` 头
    #[must_use]
    pub const fn host_header(&self) -> &HeaderValue {
        &self.host_header
    }

    /// 出站代理地址
    #[must_use]
    pub const fn outbound_proxy(&self) -> Option<&Url> {
        self.outbound_proxy.as_ref()
    }

    /// 当前上游凭据
    #[must_use]
    pub fn credentials(&self) -> Arc<UpstreamCredentials> {
        self.credentials.load()
    }

    /// 整体替换上游凭据（配置热重载时调用）
    pub fn update_credentials(&self, credentials: UpstreamCredentials) {
        self.credentials.store(credentials);
    }

    /// 拼接上游请求地址：基础路径前缀 + 调用方的原始路径与查询串
    ///
    /// 原始字节不做任何规范化，`..`、`%2e%2e` 与查询串里的字符都原样发往上游。
    pub fn upstream_uri(&self, path_and_query: &PathAndQuery) -> Result<Uri> {
        let raw = path_and_query.as_str();
        let path_and_query = if self.path_prefix.is_empty() {
            path_and_query.clone()
        } else {
            let sep = if raw.starts_with('/') { "" } else { "/" };
            PathAndQuery::try_from(format!("{}{sep}{raw}", self.path_prefix)).map_err(|e| {
                ProxyError::bad_gateway_with_source(format!("无法拼接上游路径: {raw}"), e)
            })?
        };

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ProxyError::bad_gateway_with_source(format!("无法构建上游地址: {raw}"), e))
    }
}

/// 解析上游基础地址，只接受带 host、不带查询串的 http/https 地址
fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    ensure_config!(!trimmed.is_empty(), "上游地址不能为空");

    let url = Url::parse(trimmed)?;
    ensure_config!(
        matches!(url.scheme(), "http" | "https"),
        "上游地址必须是 http 或 https: {}",
        trimmed
    );
    ensure_config!(url.host().is_some(), "上游地址缺少 host: {}", trimmed);
    ensure_config!(url.query().is_none(), "上游地址不能带查询串: {}", trimmed);

    Ok(url)
}

/// 由基础地址得到 `Host` 头，仅在显式指定端口时带上端口
fn host_header(url: &Url) -> Result<String> {
    let host = match url
        .host()
        .ok_or_else(|| crate::config_error!("上游地址缺少 host: {}", url))?
    {
        Host::Domain(domain) => domain.to_string(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => format!("[{ip}]"),
    };

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn make_target(base: &str) -> ProxyTarget {
        ProxyTarget::new(base, UpstreamCredentials::default()).unwrap()
    }

    fn upstream(target: &ProxyTarget, raw: &'static str) -> String {
        target
            .upstream_uri(&PathAndQuery::from_static(raw))
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_openai_target() {
        let target = make_target(OPENAI_BASE_URL);
        assert_eq!(target.host_header(), "api.openai.com");
        assert!(target.outbound_proxy().is_none());
    }

    #[test]
    fn test_host_header_keeps_explicit_port() {
        assert_eq!(make_target("http://127.0.0.1:8081").host_header(), "127.0.0.1:8081");
        assert_eq!(make_target("http://[::1]:9000").host_header(), "[::1]:9000");
    }

    #[test]
    fn test_invalid_base_urls_are_rejected() {
        for raw in [
            "",
            "not a url",
            "ftp://example.com",
            "unix:/tmp/sock",
            "https://api.openai.com/?key=1",
        ] {
            assert!(
                ProxyTarget::new(raw, UpstreamCredentials::default()).is_err(),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_upstream_uri_preserves_path_and_query() {
        let target = make_target(OPENAI_BASE_URL);

        assert_eq!(upstream(&target, "/v1/models"), "https://api.openai.com/v1/models");
        assert_eq!(
            upstream(&target, "/v1/files?purpose=fine-tune&limit=2"),
            "https://api.openai.com/v1/files?purpose=fine-tune&limit=2"
        );
        assert_eq!(upstream(&target, "/"), "https://api.openai.com/");
    }

    #[test]
    fn test_upstream_uri_does_not_normalize() {
        let target = make_target(OPENAI_BASE_URL);

        assert_eq!(
            upstream(&target, "/v1/a/../models"),
            "https://api.openai.com/v1/a/../models"
        );
        assert_eq!(
            upstream(&target, "/v1/%2e%2e/admin"),
            "https://api.openai.com/v1/%2e%2e/admin"
        );
        assert_eq!(
            upstream(&target, "/v1/models?q='a'"),
            "https://api.openai.com/v1/models?q='a'"
        );
    }

    #[test]
    fn test_upstream_uri_joins_base_path() {
        let target = make_target("http://localhost:8081/openai/");
        assert_eq!(
            upstream(&target, "/v1/models?x=1"),
            "http://localhost:8081/openai/v1/models?x=1"
        );
    }

    #[test]
    fn test_credentials_are_live() {
        let target = ProxyTarget::new(
            OPENAI_BASE_URL,
            UpstreamCredentials::new(Some("sk-old".to_string()), None),
        )
        .unwrap();
        let before = target.credentials();

        target.update_credentials(UpstreamCredentials::new(
            Some("sk-new".to_string()),
            Some("org-1".to_string()),
        ));

        assert_eq!(before.token(), Some("sk-old"));
        assert_eq!(target.credentials().token(), Some("sk-new"));
        assert_eq!(target.credentials().org(), Some("org-1"));
    }

    #[test]
    fn test_outbound_proxy() {
        let target = make_target(OPENAI_BASE_URL)
            .with_outbound_proxy(Some("http://127.0.0.1:3128"))
            .unwrap();
        assert_eq!(
            target.outbound_proxy().map(Url::as_str),
            Some("http://127.0.0.1:3128/")
        );

        let target = make_target(OPENAI_BASE_URL).with_outbound_proxy(Some("  ")).unwrap();
        assert!(target.outbound_proxy().is_none());

        for raw in ["::not a url::", "socks5://127.0.0.1:1080"] {
            assert!(
                make_target(OPENAI_BASE_URL).with_outbound_proxy(Some(raw)).is_err(),
                "{raw} should be rejected"
            );
        }
    }
}
