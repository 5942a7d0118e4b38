//! # 授权闸门中间件
//!
//! 从 `Authorization` 头提取调用方令牌并与授权存储比对，
//! 未授权直接返回 403（空响应体），授权通过则原样交给转发处理器。

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::proxy::ProxyState;

/// 令牌前缀
pub const TOKEN_PREFIX: &str = "Bearer ";

/// 从 `Authorization` 头的值中提取令牌
///
/// 带 `Bearer ` 前缀时去掉前缀，否则整个值就是令牌（兼容省略认证方案的调用方）。
/// 空值返回 `None`，调用方应在查询授权存储之前直接拒绝。
#[must_use]
pub fn extract_token(header_value: &str) -> Option<&str> {
    let token = header_value
        .strip_prefix(TOKEN_PREFIX)
        .unwrap_or(header_value);
    (!token.is_empty()).then_some(token)
}

/// Axum授权中间件
pub async fn authorize(
    State(state): State<ProxyState>,
    request: Request,
    next: Next,
) -> Response {
    // 非可见ASCII的头值按缺失处理
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_token);
    let token_present = token.is_some();
    let authorized = token.is_some_and(|token| state.store().is_authorized(token));

    if !authorized {
        tracing::debug!(
            method = %request.method(),
            path = %request.uri().path(),
            token_present,
            "caller rejected"
        );
        return StatusCode::FORBIDDEN.into_response();
    }

    next.run(request).await
}
