//! Bearer-token authorization for the gateway API.
//!
//! With no tokens configured the gateway runs open and every request is
//! accepted. `/health` never goes through this check.

use super::GatewayConfig;
use axum::http::{HeaderMap, header};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct GatewayAuth {
    tokens: HashSet<String>,
}

impl GatewayAuth {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.auth_tokens.iter().cloned())
    }

    /// Blank tokens are ignored.
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn is_open_mode(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn accepts(&self, token: &str) -> bool {
        self.is_open_mode() || self.tokens.contains(token)
    }

    /// Check the `Authorization: Bearer <token>` header.
    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        if self.is_open_mode() {
            return true;
        }
        bearer_token(headers).is_some_and(|token| self.tokens.contains(token))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_open_mode_accepts_everything() {
        let auth = GatewayAuth::from_config(&GatewayConfig::default());
        assert!(auth.is_open_mode());
        assert!(auth.accepts("anything"));
        assert!(auth.authorize(&HeaderMap::new()));
    }

    #[test]
    fn test_blank_tokens_do_not_count() {
        let auth = GatewayAuth::new(vec!["".into(), "  ".into()]);
        assert!(auth.is_open_mode());
    }

    #[test]
    fn test_authorize_bearer_header() {
        let auth = GatewayAuth::new(vec!["token-1".into(), "token-2".into()]);
        assert!(auth.accepts("token-2"));
        assert!(!auth.accepts("wrong"));
        assert!(!auth.authorize(&HeaderMap::new()));
        assert!(auth.authorize(&headers("Bearer token-1")));
        assert!(auth.authorize(&headers("bearer token-2")));
        assert!(!auth.authorize(&headers("Basic token-1")));
        assert!(!auth.authorize(&headers("Bearer ")));
        assert!(!auth.authorize(&headers("Bearer other")));
    }
}
