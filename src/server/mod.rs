//! The HTTP/SSE serving layer.
//!
//! Routing, admission control, and the middleware stack. Two fully
//! independent concurrency gates back `/run` and `/stream`; auth (when
//! enabled) runs before any body byte is read, rate limiting right
//! after it.

pub mod admission;
pub mod cors;
pub mod handlers;
pub mod rate_limit;
pub mod sse;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use adapter_auth::{auth_middleware, AuthLayerState};
use adapter_registry::Registry;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AdapterConfig;
use admission::ConcurrencyGate;
use rate_limit::{RateLimitState, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AdapterConfig>,
    pub registry: Arc<Registry>,
    pub run_gate: Arc<ConcurrencyGate>,
    pub stream_gate: Arc<ConcurrencyGate>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: AdapterConfig, registry: Arc<Registry>) -> Self {
        let queue_timeout = Duration::from_millis(config.server.queue_timeout_ms);
        Self {
            run_gate: Arc::new(ConcurrencyGate::new(
                config.server.max_concurrent_requests,
                config.server.max_queue_size,
                queue_timeout,
            )),
            stream_gate: Arc::new(ConcurrencyGate::new(
                config.server.max_concurrent_streams,
                config.server.max_queue_size,
                queue_timeout,
            )),
            config: Arc::new(config),
            registry,
            http: reqwest::Client::new(),
        }
    }
}

/// Assemble the full router with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    let mut api = Router::new()
        .route("/run", post(handlers::run))
        .route("/stream", post(handlers::stream));

    // Inner to outer: rate limit, then auth, so the limiter sees the
    // authenticated principal.
    if state.config.rate_limit.enabled {
        let rate_state = RateLimitState {
            limiter: Arc::new(RateLimiter::new(&state.config.rate_limit)),
            trust_proxy_headers: state.config.server.trust_proxy_headers,
        };
        api = api.layer(from_fn_with_state(
            rate_state,
            rate_limit::rate_limit_middleware,
        ));
    }
    if state.config.auth.enabled {
        let auth_state = AuthLayerState::new(state.config.auth.clone(), None);
        api = api.layer(from_fn_with_state(auth_state, auth_middleware));
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .merge(api)
        .fallback(handlers::not_found);

    if state.config.cors.enabled {
        let cors_config = Arc::new(state.config.cors.clone());
        router = router.layer(from_fn_with_state(cors_config, cors::cors_middleware));
    }
    if state.config.server.security_headers {
        router = router.layer(axum::middleware::from_fn(
            cors::security_headers_middleware,
        ));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(config: AdapterConfig, registry: Arc<Registry>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::new(config, registry);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "llm-adapter listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    crate::logging::close_all();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
