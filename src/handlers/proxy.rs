//! Catch-all passthrough handler
//!
//! Any request without a dedicated route is forwarded to the same path on the
//! backend. Request and response bodies are streamed in both directions.

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::metrics::Route;
use crate::middleware::RequestId;
use crate::upstream::{TrackedStream, forwardable_response_headers};
use axum::{
    Extension,
    body::Body,
    extract::{Request, State},
    response::Response,
};
use futures::TryStreamExt;

/// Passthrough handler
///
/// Method, query string, end-to-end headers, and body are forwarded unchanged. The
/// backend's status (including non-2xx) and end-to-end headers are returned as is.
///
/// # Errors
///
/// Returns 502 if the backend cannot be reached.
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    request: Request,
) -> AppResult<Response> {
    state.count_request(Route::Passthrough);

    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = state.upstream().backend().url_for(path_and_query);

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        url = %url,
        "Passing request through to backend"
    );

    let outgoing = reqwest::Body::wrap_stream(
        body.into_data_stream()
            .map_err(|e| std::io::Error::other(e.to_string())),
    );

    let upstream = state
        .upstream()
        .forward(parts.method.clone(), path_and_query, &parts.headers, outgoing)
        .await
        .inspect_err(|e| {
            tracing::error!(
                request_id = %request_id,
                method = %parts.method,
                url = %url,
                error = %e,
                "Passthrough forwarding failed"
            );
            state.count_upstream_failure(Route::Passthrough, e.error_type());
        })?;

    let status = upstream.status();
    let headers = forwardable_response_headers(upstream.headers());
    if !status.is_success() {
        tracing::debug!(
            request_id = %request_id,
            url = %url,
            status = status.as_u16(),
            "Backend returned non-success status on passthrough"
        );
    }

    let body = Body::from_stream(TrackedStream::new(
        upstream.bytes_stream(),
        state.metrics().clone(),
        Route::Passthrough,
        url,
    ));

    let mut response = Response::builder()
        .status(status)
        .body(body)
        .map_err(|e| AppError::Internal(format!("failed to build response: {}", e)))?;
    *response.headers_mut() = headers;
    Ok(response)
}
