//! Shared-secret authentication middleware (§6 "Auth").
//!
//! When `config.apiKey` is set, every request must carry it either as
//! `Authorization: Bearer <key>` or `x-api-key: <key>`, except the
//! handful of paths listed in [`is_exempt`]. When no key is configured the
//! server only ever binds loopback (`127.0.0.1`), so the middleware lets
//! everything through — there is nothing to check.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::{GatewayError, GatewayErrorCode, GatewayErrorContext};
use crate::state::AppState;

/// Paths reachable without a key: the root, the health check, and the
/// bundled UI's static assets.
fn is_exempt(path: &str) -> bool {
    path == "/" || path == "/health" || path.starts_with("/ui/")
}

/// Extracts the caller-supplied key from either `Authorization: Bearer
/// <key>` or `x-api-key: <key>`.
fn extract_key(request: &Request<Body>) -> Option<&str> {
    if let Some(value) = request.headers().get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(value);
    }
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Rejects requests missing or mismatching the configured shared secret.
pub async fn require_api_key(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let Some(expected) = &state.config.api_key else {
        return next.run(request).await;
    };
    if is_exempt(request.uri().path()) {
        return next.run(request).await;
    }
    match extract_key(&request) {
        Some(key) if key == expected => next.run(request).await,
        _ => GatewayError::new(
            GatewayErrorCode::ApiAuthFailed,
            "missing or invalid API key".to_string(),
            GatewayErrorContext::new("auth", "require_api_key"),
            false,
        )
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_health_and_ui_paths_are_exempt() {
        assert!(is_exempt("/"));
        assert!(is_exempt("/health"));
        assert!(is_exempt("/ui/index.html"));
        assert!(!is_exempt("/v1/messages"));
    }

    #[test]
    fn bearer_and_x_api_key_headers_both_resolve() {
        let bearer = Request::builder()
            .header(axum::http::header::AUTHORIZATION, "Bearer secret-value")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_key(&bearer), Some("secret-value"));

        let api_key_header = Request::builder()
            .header("x-api-key", "secret-value")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_key(&api_key_header), Some("secret-value"));
    }

    #[test]
    fn missing_key_resolves_to_none() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_key(&request), None);
    }
}
