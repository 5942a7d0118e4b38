//! # 代理服务模块
//!
//! 请求转发、上游凭据注入与 HTTP 服务入口

pub mod forwarder;
pub mod injector;
pub mod server;
pub mod state;
pub mod target;

pub use forwarder::ForwardingEngine;
pub use injector::{CredentialInjector, ORG_HEADER};
pub use server::{ProxyServer, router, serve};
pub use state::ProxyState;
pub use target::{OPENAI_BASE_URL, ProxyTarget, UpstreamCredentials};
