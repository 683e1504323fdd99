/// Authentication extractors for admin routes and the inbound relay
use crate::{context::AppContext, error::WebvhError};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Admin caller - requires the configured API key when one is set
#[derive(Debug, Clone)]
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuth {
    type Rejection = WebvhError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.service.admin_api_key.as_deref() else {
            return Ok(AdminAuth);
        };

        if let Err(e) = check_api_key(&parts.headers, expected) {
            tracing::warn!("Admin request rejected: {}", e);
            return Err(e);
        }

        Ok(AdminAuth)
    }
}

/// Agent relaying an inbound message - requires the inbound key when one is set
#[derive(Debug, Clone)]
pub struct InboundAuth;

#[async_trait]
impl FromRequestParts<AppContext> for InboundAuth {
    type Rejection = WebvhError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.service.inbound_key() else {
            return Ok(InboundAuth);
        };

        if let Err(e) = check_api_key(&parts.headers, expected) {
            tracing::warn!("Inbound message rejected: {}", e);
            return Err(e);
        }

        Ok(InboundAuth)
    }
}

/// Compare the `x-api-key` header against `expected`
fn check_api_key(headers: &HeaderMap, expected: &str) -> Result<(), WebvhError> {
    let provided = extract_api_key(headers)
        .ok_or_else(|| WebvhError::Authentication("Missing x-api-key header".to_string()))?;

    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return Err(WebvhError::Authentication("Invalid API key".to_string()));
    }

    Ok(())
}

/// Extract the API key header
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_api_key() {
        let mut headers = HeaderMap::new();
        assert!(extract_api_key(&headers).is_none());

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("  "));
        assert!(extract_api_key(&headers).is_none());

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("secret"));
        assert_eq!(extract_api_key(&headers), Some("secret"));
    }

    #[test]
    fn test_check_api_key() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            check_api_key(&headers, "secret"),
            Err(WebvhError::Authentication(_))
        ));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("wrong"));
        assert!(matches!(
            check_api_key(&headers, "secret"),
            Err(WebvhError::Authentication(_))
        ));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("secret"));
        assert!(check_api_key(&headers, "secret").is_ok());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secrets"));
    }
}
