//! # OpenAI Auth Proxy Library
//!
//! 带调用方授权与上游凭据注入的 `OpenAI` API 转发代理

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod utils;

// Re-export commonly used types
pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
