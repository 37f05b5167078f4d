//! Model catalog handler
//!
//! Handles GET and POST /v1/models by merging the backend's listing with the
//! configured routing and rewrite aliases.

use crate::catalog;
use crate::error::AppResult;
use crate::handlers::AppState;
use crate::metrics::Route;
use crate::middleware::RequestId;
use crate::types::ModelsListResponse;
use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, header},
};

/// /v1/models handler
///
/// # Errors
///
/// - 502 if the backend is unreachable or answers non-2xx
/// - 500 if the backend catalog is malformed
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> AppResult<Json<ModelsListResponse>> {
    state.count_request(Route::Models);
    let url = state.upstream().backend().models_url();

    let upstream = state
        .upstream()
        .fetch_models(headers.get(header::AUTHORIZATION))
        .await
        .and_then(|payload| catalog::parse_upstream(&url, payload))
        .inspect_err(|e| {
            tracing::error!(
                request_id = %request_id,
                url = %url,
                error = %e,
                error_type = e.error_type(),
                "Failed to fetch model catalog"
            );
            state.count_upstream_failure(Route::Models, e.error_type());
        })?;

    let upstream_count = upstream.len();
    let merged = catalog::merge(upstream, state.config().virtual_aliases());

    tracing::debug!(
        request_id = %request_id,
        upstream_models = upstream_count,
        virtual_models = merged.len() - upstream_count,
        "Model catalog merged"
    );

    Ok(Json(ModelsListResponse::new(merged)))
}
