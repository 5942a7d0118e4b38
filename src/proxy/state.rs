//! # 代理共享状态
//!
//! 路由与授权中间件通过 axum `State` 拿到的依赖集合

use std::sync::Arc;

use crate::auth::AuthorizationStore;
use crate::proxy::ForwardingEngine;

/// 代理服务的共享状态
///
/// 持有授权列表与转发引擎，每个请求处理器拿到的都是同一份。
#[derive(Clone)]
pub struct ProxyState {
    store: Arc<AuthorizationStore>,
    forwarder: Arc<ForwardingEngine>,
}

impl ProxyState {
    /// 创建共享状态
    #[must_use]
    pub const fn new(store: Arc<AuthorizationStore>, forwarder: Arc<ForwardingEngine>) -> Self {
        Self { store, forwarder }
    }

    /// 调用方授权存储
    #[must_use]
    pub fn store(&self) -> &AuthorizationStore {
        &self.store
    }

    /// 上游转发引擎
    #[must_use]
    pub fn forwarder(&self) -> &ForwardingEngine {
        &self.forwarder
    }
}
