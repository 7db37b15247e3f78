//! Token-bucket rate limiting per caller identity.
//!
//! Identity is the authenticated principal when auth is on; otherwise
//! the peer IP, or the first `X-Forwarded-For` entry when proxy headers
//! are trusted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use adapter_auth::Principal;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::error::AdapterError;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket per identity: `requests_per_minute` refill,
/// `burst` capacity.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    refill_per_sec: f64,
    capacity: f64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            refill_per_sec: f64::from(config.requests_per_minute) / 60.0,
            capacity: f64::from(config.burst.max(1)),
        }
    }

    /// Take one token for `identity`. `false` means rate limited.
    pub fn check(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.capacity,
                last_refill: now,
            });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared state for [`rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub trust_proxy_headers: bool,
}

/// Resolve the caller identity: authenticated principal, else the first
/// `X-Forwarded-For` entry when proxy headers are trusted, else the
/// peer IP.
fn identity(state: &RateLimitState, request: &Request) -> String {
    if let Some(principal) = request.extensions().get::<Principal>() {
        return principal.fingerprint.clone();
    }
    if state.trust_proxy_headers {
        if let Some(forwarded) = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(first) = forwarded.split(',').next().map(str::trim).filter(|s| !s.is_empty())
            {
                return first.to_string();
            }
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let identity = identity(&state, &request);
    if !state.limiter.check(&identity) {
        tracing::debug!(identity = %identity, "Rate limited");
        return AdapterError::RateLimited.into_response();
    }
    next.run(request).await
}
