//! # 代理服务器
//!
//! 所有方法、所有路径都进入同一条处理链：先经过授权闸门，再交给转发引擎。

use axum::{
    Router,
    extract::{Request, State},
    middleware,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::auth::authorize;
use crate::error::{ProxyError, Result};
use crate::proxy::ProxyState;

/// 构建代理路由
///
/// 没有任何具体路由，所有请求都落到 fallback 处理器上。
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .fallback(forward_request)
        .layer(middleware::from_fn_with_state(state.clone(), authorize))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 转发处理器，上游失败时由 `ProxyError` 映射为无正文的 502
async fn forward_request(State(state): State<ProxyState>, request: Request) -> Response {
    match state.forwarder().forward(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// 代理服务器
pub struct ProxyServer {
    bind_addr: SocketAddr,
    state: ProxyState,
}

impl ProxyServer {
    /// 创建新的代理服务器
    #[must_use]
    pub const fn new(bind_addr: SocketAddr, state: ProxyState) -> Self {
        Self { bind_addr, state }
    }

    /// 获取绑定地址
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// 绑定端口并开始服务，直到收到 Ctrl-C
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            ProxyError::server_start_with_source(format!("端口绑定失败: {}", self.bind_addr), e)
        })?;

        tracing::info!(bind_addr = %self.bind_addr, "代理服务器开始监听");

        serve(listener, self.state, shutdown_signal()).await?;

        tracing::info!("代理服务器已停止");
        Ok(())
    }
}

/// 在已绑定的监听器上提供代理服务
pub async fn serve<F>(listener: TcpListener, state: ProxyState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ProxyError::server_start_with_source("代理服务器运行失败", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("无法监听退出信号: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，开始关闭");
}
