//! CORS and security-header middleware.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::config::CorsConfig;

/// Add the default security headers to every response.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    response
}

fn origin_allowed(config: &CorsConfig, origin: &str) -> bool {
    config
        .allowed_origins
        .iter()
        .any(|allowed| allowed == "*" || allowed == origin)
}

/// Handle CORS preflights and annotate responses for allowed origins.
///
/// Preflight (`OPTIONS` with `Access-Control-Request-Method`) answers
/// 204 directly, echoing the configured allowed headers and methods.
pub async fn cors_middleware(
    State(config): State<Arc<CorsConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let allowed_origin = origin
        .as_deref()
        .filter(|o| origin_allowed(&config, o))
        .and_then(|o| HeaderValue::from_str(o).ok());

    let is_preflight = request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);
    if is_preflight {
        let mut response = Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(axum::body::Body::empty())
            .unwrap_or_default();
        let headers = response.headers_mut();
        if let Some(origin) = allowed_origin {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            if let Ok(value) = HeaderValue::from_str(&config.allowed_headers.join(", ")) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
            }
            if let Ok(value) = HeaderValue::from_str(&config.allowed_methods.join(", ")) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, value);
            }
        }
        return response;
    }

    let mut response = next.run(request).await;
    if let Some(origin) = allowed_origin {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_allowed_exact_and_wildcard() {
        let exact = CorsConfig {
            enabled: true,
            allowed_origins: vec!["https://example.com".to_string()],
            ..Default::default()
        };
        assert!(origin_allowed(&exact, "https://example.com"));
        assert!(!origin_allowed(&exact, "https://evil.com"));

        let wildcard = CorsConfig {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            ..Default::default()
        };
        assert!(origin_allowed(&wildcard, "https://anything.test"));
    }
}
