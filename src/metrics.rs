//! Prometheus metrics collection for the rewrite router
//!
//! Tracks:
//! - Requests per route
//! - Routing decisions per alias and target model
//! - Rewrites applied per model
//! - Upstream failures and stream terminations
//! - Estimated prompt sizes
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Route label for request-scoped metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    ChatCompletions,
    Models,
    Passthrough,
}

impl Route {
    /// Convert route to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::ChatCompletions => "chat_completions",
            Route::Models => "models",
            Route::Passthrough => "passthrough",
        }
    }
}

/// How a response stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTermination {
    /// Upstream body was forwarded to the end
    Completed,
    /// Client went away before the upstream body ended
    ClientDisconnect,
    /// Upstream read failed after streaming began
    UpstreamError,
}

impl StreamTermination {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamTermination::Completed => "completed",
            StreamTermination::ClientDisconnect => "client_disconnect",
            StreamTermination::UpstreamError => "upstream_error",
        }
    }
}

/// Metrics collector
///
/// Cheap to clone; every clone records into the same registry.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    routing_decisions: IntCounterVec,
    rewrites: IntCounterVec,
    upstream_failures: IntCounterVec,
    stream_terminations: IntCounterVec,
    estimated_prompt_tokens: Histogram,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 3 routes
        let requests_total = IntCounterVec::new(
            Opts::new(
                "rewrite_router_requests_total",
                "Total number of inbound requests by route",
            ),
            &["route"],
        )?;

        // Cardinality: bounded by the configured routing aliases and their buckets
        let routing_decisions = IntCounterVec::new(
            Opts::new(
                "rewrite_router_routing_decisions_total",
                "Routing decisions by requested alias and selected target model",
            ),
            &["alias", "target"],
        )?;

        // Cardinality: bounded by the configured rewrite rules
        let rewrites = IntCounterVec::new(
            Opts::new(
                "rewrite_router_rewrites_total",
                "Rewrite rules applied by model name",
            ),
            &["alias"],
        )?;

        // kind is AppError::error_type(): connectivity, status or protocol
        let upstream_failures = IntCounterVec::new(
            Opts::new(
                "rewrite_router_upstream_failures_total",
                "Upstream failures before any response body was streamed, by route and kind",
            ),
            &["route", "kind"],
        )?;

        let stream_terminations = IntCounterVec::new(
            Opts::new(
                "rewrite_router_stream_terminations_total",
                "Streamed responses by route and how they ended",
            ),
            &["route", "reason"],
        )?;

        let estimated_prompt_tokens = Histogram::with_opts(
            HistogramOpts::new(
                "rewrite_router_estimated_prompt_tokens",
                "Estimated prompt size of routed chat requests, in tokens",
            )
            .buckets(vec![
                256.0, 1024.0, 4096.0, 8192.0, 16384.0, 32768.0, 65536.0, 131072.0, 262144.0,
            ]),
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(routing_decisions.clone()))?;
        registry.register(Box::new(rewrites.clone()))?;
        registry.register(Box::new(upstream_failures.clone()))?;
        registry.register(Box::new(stream_terminations.clone()))?;
        registry.register(Box::new(estimated_prompt_tokens.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            routing_decisions,
            rewrites,
            upstream_failures,
            stream_terminations,
            estimated_prompt_tokens,
        })
    }

    /// Record an inbound request
    pub fn record_request(&self, route: Route) -> Result<(), prometheus::Error> {
        self.requests_total
            .get_metric_with_label_values(&[route.as_str()])?
            .inc();
        Ok(())
    }

    /// Record a routing decision and the prompt estimate behind it
    pub fn record_routing_decision(
        &self,
        alias: &str,
        target: &str,
        estimated_tokens: usize,
    ) -> Result<(), prometheus::Error> {
        self.routing_decisions
            .get_metric_with_label_values(&[alias, target])?
            .inc();
        self.estimated_prompt_tokens.observe(estimated_tokens as f64);
        Ok(())
    }

    /// Record that the rewrite rule keyed by `alias` was applied
    pub fn record_rewrite(&self, alias: &str) -> Result<(), prometheus::Error> {
        self.rewrites.get_metric_with_label_values(&[alias])?.inc();
        Ok(())
    }

    /// Record an upstream failure that produced an error response
    pub fn record_upstream_failure(
        &self,
        route: Route,
        kind: &str,
    ) -> Result<(), prometheus::Error> {
        self.upstream_failures
            .get_metric_with_label_values(&[route.as_str(), kind])?
            .inc();
        Ok(())
    }

    /// Record how a streamed response ended
    pub fn record_stream_termination(
        &self,
        route: Route,
        reason: StreamTermination,
    ) -> Result<(), prometheus::Error> {
        self.stream_terminations
            .get_metric_with_label_values(&[route.as_str(), reason.as_str()])?
            .inc();
        Ok(())
    }

    /// Current count of stream terminations for a route and reason
    pub fn stream_terminations_count(&self, route: Route, reason: StreamTermination) -> u64 {
        self.stream_terminations
            .get_metric_with_label_values(&[route.as_str(), reason.as_str()])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Gather all metrics in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not valid UTF-8.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("metrics output is not valid UTF-8: {}", e))
        })
    }
}
