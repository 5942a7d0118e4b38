//! # 调用方认证模块
//!
//! 动态授权列表与请求入口处的授权闸门

pub mod gate;
pub mod store;

pub use gate::{TOKEN_PREFIX, authorize, extract_token};
pub use store::{AuthorizationStore, AuthorizedTokenSet};
