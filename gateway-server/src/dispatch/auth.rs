use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use gateway_core::config::SecurityConfig;

/// Constant-time comparison against every configured token, so a timing
/// attack can't be used to discover a valid one character at a time.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub fn validate_token(security: &SecurityConfig, candidate: &str) -> bool {
    security
        .tokens
        .iter()
        .any(|known| constant_time_eq(known, candidate))
}

fn token_from_headers(headers: &HeaderMap, header_name: &str) -> Option<String> {
    let raw = headers.get(header_name)?.to_str().ok()?;
    Some(raw.strip_prefix("Bearer ").unwrap_or(raw).to_string())
}

/// Axum extractor enforcing the bearer-token policy on every HTTP route
/// except `/health`. No tokens configured means auth is open, a permissive
/// local-dev default.
pub struct AuthBearer;

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AuthBearer
where
    S: Send + Sync,
    Arc<crate::lifecycle::AppState>: axum::extract::FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state: Arc<crate::lifecycle::AppState> =
            axum::extract::FromRef::from_ref(state);
        let security = &app_state.config.security;
        if security.tokens.is_empty() {
            return Ok(AuthBearer);
        }

        let token = token_from_headers(&parts.headers, &security.header_name)
            .ok_or((StatusCode::UNAUTHORIZED, "authentication token missing"))?;

        if validate_token(security, &token) {
            Ok(AuthBearer)
        } else {
            Err((StatusCode::UNAUTHORIZED, "authentication token invalid"))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// WebSocket upgrades can't carry a custom header from a browser, so the
/// streaming route also accepts `?token=` as a query parameter.
pub fn validate_ws_token(security: &SecurityConfig, query: &Query<TokenQuery>) -> bool {
    if security.tokens.is_empty() {
        return true;
    }
    match &query.token {
        Some(token) => validate_token(security, token),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security_with(tokens: Vec<&str>) -> SecurityConfig {
        SecurityConfig {
            tokens: tokens.into_iter().map(String::from).collect(),
            header_name: "Authorization".to_string(),
        }
    }

    #[test]
    fn empty_token_list_allows_anything() {
        let security = security_with(vec![]);
        assert!(validate_token(&security, "anything"));
    }

    #[test]
    fn matching_token_is_accepted() {
        let security = security_with(vec!["secret-1", "secret-2"]);
        assert!(validate_token(&security, "secret-2"));
        assert!(!validate_token(&security, "secret-3"));
    }

    #[test]
    fn constant_time_eq_rejects_different_lengths() {
        assert!(!constant_time_eq("short", "longer-string"));
    }
}
