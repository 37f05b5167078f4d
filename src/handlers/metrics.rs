//! Prometheus metrics endpoint

use axum::{extract::State, http::StatusCode};

use crate::handlers::AppState;

/// Metrics handler for Prometheus scraping
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` if metrics collection fails
pub async fn handler(State(state): State<AppState>) -> (StatusCode, String) {
    match state.metrics().gather() {
        Ok(output) => (StatusCode::OK, output),
        Err(e) => {
            tracing::error!(error = %e, "Failed to gather metrics for Prometheus scraping");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to gather metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::state_for;
    use crate::metrics::Route;

    #[tokio::test]
    async fn test_metrics_handler_returns_prometheus_format() {
        let state = state_for("http://localhost:3000");
        state.count_request(Route::ChatCompletions);
        state
            .metrics()
            .record_routing_decision("gpt-4o-auto", "gpt-4o-8k", 100)
            .unwrap();

        let (status, body) = handler(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# HELP rewrite_router_requests_total"));
        assert!(body.contains("# TYPE rewrite_router_requests_total counter"));
        assert!(body.contains("# TYPE rewrite_router_estimated_prompt_tokens histogram"));
    }

    #[tokio::test]
    async fn test_metrics_lines_are_well_formed() {
        let state = state_for("http://localhost:3000");
        state.count_request(Route::Passthrough);
        state.count_upstream_failure(Route::Passthrough, "connectivity");

        let (_, body) = handler(State(state)).await;
        let metric_lines: Vec<&str> = body
            .lines()
            .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
            .collect();
        assert!(!metric_lines.is_empty());

        for line in metric_lines {
            assert!(line.starts_with("rewrite_router_"), "unexpected line: {}", line);
            let value = line.split_whitespace().last().unwrap();
            assert!(
                value.parse::<f64>().is_ok() || value == "+Inf",
                "line should end with a number: {}",
                line
            );
        }
    }
}
