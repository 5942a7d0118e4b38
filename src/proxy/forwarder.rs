//! # 转发引擎
//!
//! 把已授权的请求转发到固定上游：方法、原始路径与查询串逐字节保留，
//! 请求头复制后交给凭据注入器改写，请求体与响应体（含 trailers）都以流的方式
//! 双向透传，不在内存中整体缓冲。单次尝试，不做重试。

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, Uri, Version, header, uri::PathAndQuery},
    response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hyper_tls::HttpsConnector;
use hyper_util::{
    client::legacy::{
        Client, ResponseFuture,
        connect::{HttpConnector, proxy::Tunnel},
    },
    rt::TokioExecutor,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_native_tls::TlsConnector;
use url::Url;
use uuid::Uuid;

use crate::error::{Context, ProxyError, Result};
use crate::proxy::{CredentialInjector, ProxyTarget};

/// 逐跳头部，由各段连接自己管理，不跨越代理
const HOP_BY_HOP_HEADERS: [HeaderName; 6] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// 上游 HTTP 客户端：直连，或经出站代理的 CONNECT 隧道
enum UpstreamClient {
    Direct(Client<HttpsConnector<HttpConnector>, Body>),
    Tunneled(Client<HttpsConnector<Tunnel<HttpConnector>>, Body>),
}

impl UpstreamClient {
    fn request(&self, request: Request) -> ResponseFuture {
        match self {
            Self::Direct(client) => client.request(request),
            Self::Tunneled(client) => client.request(request),
        }
    }
}

/// 转发引擎
pub struct ForwardingEngine {
    client: UpstreamClient,
    target: Arc<ProxyTarget>,
}

impl ForwardingEngine {
    /// 创建转发引擎
    ///
    /// 配置了出站代理时，所有上游连接都经由该代理建立隧道，并且关闭上游 TLS 证书校验。
    /// 这是为受限网络环境做的有意取舍，会在启动时以警告级别记录。
    pub fn new(target: Arc<ProxyTarget>) -> Result<Self> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);

        let client = match target.outbound_proxy() {
            Some(proxy_url) => {
                tracing::warn!(
                    proxy_host = proxy_url.host_str().unwrap_or_default(),
                    "上游流量经由出站代理转发，已关闭上游 TLS 证书校验"
                );
                let tls = native_tls::TlsConnector::builder()
                    .danger_accept_invalid_certs(true)
                    .danger_accept_invalid_hostnames(true)
                    .build()?;
                let tunnel = tunnel(proxy_url, http)?;
                let connector = HttpsConnector::from((tunnel, TlsConnector::from(tls)));
                UpstreamClient::Tunneled(Client::builder(TokioExecutor::new()).build(connector))
            }
            None => {
                let tls = native_tls::TlsConnector::new()?;
                let connector = HttpsConnector::from((http, TlsConnector::from(tls)));
                UpstreamClient::Direct(Client::builder(TokioExecutor::new()).build(connector))
            }
        };

        Ok(Self { client, target })
    }

    /// 上游目标
    #[must_use]
    pub const fn target(&self) -> &Arc<ProxyTarget> {
        &self.target
    }

    /// 转发请求并把上游响应流式返回
    pub async fn forward(&self, request: Request) -> Result<Response> {
        let request_id = Uuid::new_v4();
        let start = Instant::now();
        let (mut parts, body) = request.into_parts();

        let root = PathAndQuery::from_static("/");
        parts.uri = self
            .target
            .upstream_uri(parts.uri.path_and_query().unwrap_or(&root))?;
        // 上游一律走 HTTP/1.1，调用方使用的协议版本不向上游传递
        parts.version = Version::HTTP_11;

        // 出站请求头：复制入站头部，去掉逐跳头部，再注入上游凭据
        let accepts_trailers = accepts_trailers(&parts.headers);
        strip_hop_by_hop(&mut parts.headers);
        if accepts_trailers {
            parts.headers.insert(header::TE, HeaderValue::from_static("trailers"));
        }
        CredentialInjector::rewrite(&mut parts.headers, &self.target)?;

        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        tracing::debug!(%request_id, %method, %path, "forwarding request upstream");

        let upstream = self
            .client
            .request(Request::from_parts(parts, body))
            .await
            .with_context(|| format!("request_id={request_id}"))?;

        tracing::info!(
            %request_id,
            %method,
            %path,
            status = upstream.status().as_u16(),
            elapsed_ms = start.elapsed().as_millis(),
            "upstream responded"
        );

        // 调用方断开时响应体被丢弃，上游连接随之释放
        let (mut parts, body) = upstream.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// 构建经出站代理的 CONNECT 隧道，代理地址中的用户名密码按原样用于 Basic 认证
fn tunnel(proxy_url: &Url, http: HttpConnector) -> Result<Tunnel<HttpConnector>> {
    let proxy_uri: Uri = proxy_url.as_str().parse().map_err(|e| {
        ProxyError::config_with_source(format!("无效的出站代理地址: {proxy_url}"), e)
    })?;
    let tunnel = Tunnel::new(proxy_uri, http);

    if proxy_url.username().is_empty() {
        return Ok(tunnel);
    }

    let credentials = format!(
        "{}:{}",
        proxy_url.username(),
        proxy_url.password().unwrap_or_default()
    );
    let mut auth = HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(credentials)))
        .map_err(|e| ProxyError::config_with_source("出站代理认证信息无效", e))?;
    auth.set_sensitive(true);

    Ok(tunnel.with_auth(auth))
}

/// 调用方是否声明接受 trailers（`TE: trailers`）
fn accepts_trailers(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::TE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("trailers"))
}

/// 去掉逐跳头部，以及 `Connection` 中点名的头部
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP_HEADERS.iter()) {
        headers.remove(name);
    }
}
