//! # 凭据注入
//!
//! 在出站请求构建完成之后、发往上游之前，把调用方的身份换成上游自己的凭据。

use axum::http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{AUTHORIZATION, HOST},
};

use crate::auth::TOKEN_PREFIX;
use crate::error::{ProxyError, Result};
use crate::proxy::ProxyTarget;

/// 上游组织ID请求头
pub const ORG_HEADER: HeaderName = HeaderName::from_static("openai-organization");

/// 凭据注入器
pub struct CredentialInjector;

impl CredentialInjector {
    /// 改写出站请求头
    ///
    /// `Host` 总是改为上游地址；上游令牌与组织ID只在配置了非空值时覆盖，
    /// 未配置时保留调用方原有的头，不清除也不置空。
    pub fn rewrite(headers: &mut HeaderMap, target: &ProxyTarget) -> Result<()> {
        headers.insert(HOST, target.host_header().clone());

        // 每次请求都读取最新凭据
        let credentials = target.credentials();

        if let Some(token) = credentials.token() {
            let mut value = Self::header_value(&format!("{TOKEN_PREFIX}{token}"), "token")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        if let Some(org) = credentials.org() {
            headers.insert(ORG_HEADER, Self::header_value(org, "org")?);
        }

        Ok(())
    }

    fn header_value(raw: &str, field: &str) -> Result<HeaderValue> {
        HeaderValue::from_str(raw).map_err(|e| {
            ProxyError::bad_gateway_with_source(format!("上游 {field} 无法编码为请求头"), e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::UpstreamCredentials;

    fn target(token: Option<&str>, org: Option<&str>) -> ProxyTarget {
        ProxyTarget::new(
            "https://api.openai.com",
            UpstreamCredentials::new(token.map(str::to_string), org.map(str::to_string)),
        )
        .unwrap()
    }

    fn inbound_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("proxy.internal:8080"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer caller-token"));
        headers.insert(ORG_HEADER, HeaderValue::from_static("org-caller"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn test_rewrite_overwrites_caller_identity() {
        let mut headers = inbound_headers();
        CredentialInjector::rewrite(&mut headers, &target(Some("sk-upstream"), Some("org-1")))
            .unwrap();

        assert_eq!(headers[HOST], "api.openai.com");
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-upstream");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert_eq!(headers[ORG_HEADER], "org-1");
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn test_unset_credentials_leave_headers_untouched() {
        let mut headers = inbound_headers();
        CredentialInjector::rewrite(&mut headers, &target(None, None)).unwrap();

        assert_eq!(headers[HOST], "api.openai.com");
        assert_eq!(headers[AUTHORIZATION], "Bearer caller-token");
        assert_eq!(headers[ORG_HEADER], "org-caller");
    }

    #[test]
    fn test_missing_org_is_not_added() {
        let mut headers = HeaderMap::new();
        CredentialInjector::rewrite(&mut headers, &target(Some("sk-upstream"), Some(""))).unwrap();

        assert_eq!(headers[AUTHORIZATION], "Bearer sk-upstream");
        assert!(headers.get(ORG_HEADER).is_none());
    }

    #[test]
    fn test_rewrite_reads_credentials_live() {
        let target = target(Some("sk-old"), None);
        target.update_credentials(UpstreamCredentials::new(Some("sk-new".to_string()), None));

        let mut headers = HeaderMap::new();
        CredentialInjector::rewrite(&mut headers, &target).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-new");
    }

    #[test]
    fn test_unencodable_token_is_gateway_error() {
        let target = target(Some("sk-\nbroken"), None);
        let mut headers = inbound_headers();

        let err = CredentialInjector::rewrite(&mut headers, &target).unwrap_err();
        assert!(matches!(err, ProxyError::BadGateway { .. }));
        assert_eq!(headers[AUTHORIZATION], "Bearer caller-token");
    }
}
