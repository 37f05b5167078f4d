//! HTTP request handlers

use crate::config::Config;
use crate::error::AppResult;
use crate::metrics::{Metrics, Route};
use crate::middleware::request_id_middleware;
use crate::router::TokenEstimator;
use crate::upstream::UpstreamClient;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod chat;
pub mod health;
pub mod metrics;
pub mod models;
pub mod proxy;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    upstream: Arc<UpstreamClient>,
    estimator: Arc<TokenEstimator>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create a new AppState from configuration
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client, the token encoding, or the metrics registry cannot
    /// be initialised.
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let upstream = Arc::new(UpstreamClient::new(&config.backend)?);
        let estimator = Arc::new(TokenEstimator::new(config.tokenizer.encoding)?);
        let metrics = Arc::new(Metrics::new().map_err(|e| {
            crate::error::AppError::Internal(format!("failed to initialize metrics: {}", e))
        })?);

        Ok(Self {
            config,
            upstream,
            estimator,
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Count an inbound request, logging (not failing) if the metric is unavailable
    pub(crate) fn count_request(&self, route: Route) {
        if let Err(e) = self.metrics.record_request(route) {
            tracing::warn!(error = %e, route = route.as_str(), "Failed to record request metric");
        }
    }

    pub(crate) fn count_upstream_failure(&self, route: Route, kind: &str) {
        if let Err(e) = self.metrics.record_upstream_failure(route, kind) {
            tracing::warn!(
                error = %e,
                route = route.as_str(),
                kind,
                "Failed to record upstream failure metric"
            );
        }
    }
}

/// Build the HTTP application
///
/// `/health` and `/metrics` are served locally; every path without a dedicated
/// route (and every method a dedicated route does not handle) is passed through to
/// the backend.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config().server.max_body_bytes;

    Router::new()
        .route(
            "/v1/chat/completions",
            post(chat::handler).fallback(proxy::handler),
        )
        .route(
            "/v1/models",
            get(models::handler)
                .post(models::handler)
                .fallback(proxy::handler),
        )
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .fallback(proxy::handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
}
