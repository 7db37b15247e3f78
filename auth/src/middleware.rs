//! Request authentication middleware.
//!
//! Installed ahead of the body-reading handlers so credential failures
//! surface before any body byte is parsed.

use std::sync::Arc;

use adapter_protocol::{ErrorBody, ErrorCode, ErrorEnvelope};
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::config::AuthConfig;
use crate::key::{credential_fingerprint, KeyVerifier};

/// How the accepted credential was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Bearer,
    ApiKeyHeader,
}

/// The authenticated caller, inserted into request extensions.
///
/// `fingerprint` is a non-reversible digest prefix of the credential;
/// downstream layers (rate limiting, logs) identify callers by it.
#[derive(Debug, Clone)]
pub struct Principal {
    pub fingerprint: String,
    pub method: AuthMethod,
}

/// Optional post-authentication authorization hook. Returning `false`
/// denies with 403.
pub type AuthorizeFn = Arc<dyn Fn(&Principal) -> bool + Send + Sync>;

/// Shared state for [`auth_middleware`].
#[derive(Clone)]
pub struct AuthLayerState {
    config: Arc<AuthConfig>,
    verifier: Arc<KeyVerifier>,
    authorize: Option<AuthorizeFn>,
}

impl AuthLayerState {
    pub fn new(config: AuthConfig, authorize: Option<AuthorizeFn>) -> Self {
        let verifier = Arc::new(KeyVerifier::from_config(&config));
        Self {
            config: Arc::new(config),
            verifier,
            authorize,
        }
    }
}

/// Authenticate the request before any body handling.
pub async fn auth_middleware(
    State(state): State<AuthLayerState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some((credential, method)) = extract_credential(&state.config, &request) else {
        return unauthorized("Missing credentials");
    };

    if !state.verifier.verify(&credential) {
        return unauthorized("Invalid credentials");
    }

    let principal = Principal {
        fingerprint: credential_fingerprint(&credential),
        method,
    };

    if let Some(authorize) = &state.authorize {
        if !authorize(&principal) {
            tracing::debug!(principal = %principal.fingerprint, "Authorization callback denied request");
            return error_response(
                StatusCode::FORBIDDEN,
                ErrorCode::Forbidden,
                "Access denied",
            );
        }
    }

    request.extensions_mut().insert(principal);
    next.run(request).await
}

fn extract_credential(config: &AuthConfig, request: &Request) -> Option<(String, AuthMethod)> {
    if config.allow_bearer {
        if let Some(value) = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        {
            if let Some(token) = value.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some((token.to_string(), AuthMethod::Bearer));
                }
            }
        }
    }

    if config.allow_api_key_header {
        if let Some(value) = request
            .headers()
            .get(config.header_name.as_str())
            .and_then(|v| v.to_str().ok())
        {
            let value = value.trim();
            if !value.is_empty() {
                return Some((value.to_string(), AuthMethod::ApiKeyHeader));
            }
        }
    }

    None
}

fn unauthorized(message: &str) -> Response {
    error_response(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, message)
}

fn error_response(status: StatusCode, code: ErrorCode, message: &str) -> Response {
    (
        status,
        Json(ErrorEnvelope {
            error: ErrorBody::new(code, message),
        }),
    )
        .into_response()
}
