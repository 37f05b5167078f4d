//! Chat completions handler
//!
//! Handles POST /v1/chat/completions: validate, route, rewrite, forward, stream.

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::metrics::Route;
use crate::middleware::RequestId;
use crate::router::RoutingDecision;
use crate::types::ChatRequest;
use crate::upstream::{TrackedStream, frame_sse_lines, is_event_stream};
use axum::{
    Extension,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::Response,
};

/// POST /v1/chat/completions handler
///
/// The backend response is streamed back as it arrives. Event streams are
/// re-framed one event per line; any other body is forwarded chunk by chunk with
/// the backend's status and content type. Error answers to non-streaming requests
/// reach the client with their own status.
///
/// # Errors
///
/// - 400 if the body is not a valid chat request
/// - 502 if the backend is unreachable, or answers a streaming request non-2xx
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    state.count_request(Route::ChatCompletions);

    let request = ChatRequest::from_slice(&body).inspect_err(|e| {
        tracing::warn!(request_id = %request_id, error = %e, "Rejected chat request");
    })?;

    tracing::debug!(
        request_id = %request_id,
        model = %request.model(),
        messages_count = request.messages().len(),
        stream = request.is_stream(),
        "Received chat completions request"
    );

    let request = prepare(&state, request, request_id);
    let url = state.upstream().backend().chat_completions_url();

    let upstream = state
        .upstream()
        .send_chat(&request, headers.get(header::AUTHORIZATION))
        .await
        .inspect_err(|e| {
            tracing::error!(
                request_id = %request_id,
                url = %url,
                target_model = %request.model(),
                error = %e,
                error_type = e.error_type(),
                "Chat completion forwarding failed"
            );
            state.count_upstream_failure(Route::ChatCompletions, e.error_type());
        })?;

    let status = upstream.status();
    if !status.is_success() {
        tracing::warn!(
            request_id = %request_id,
            url = %url,
            target_model = %request.model(),
            status = status.as_u16(),
            "Backend rejected chat completion, relaying its status"
        );
        state.count_upstream_failure(Route::ChatCompletions, "status");
    }

    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    let metrics = state.metrics().clone();

    let body = if is_event_stream(content_type.as_ref()) {
        Body::from_stream(TrackedStream::new(
            frame_sse_lines(upstream.bytes_stream()),
            metrics,
            Route::ChatCompletions,
            url,
        ))
    } else {
        Body::from_stream(TrackedStream::new(
            upstream.bytes_stream(),
            metrics,
            Route::ChatCompletions,
            url,
        ))
    };

    let mut builder = Response::builder().status(status);
    builder = builder.header(
        header::CONTENT_TYPE,
        content_type.unwrap_or_else(|| HeaderValue::from_static("application/json")),
    );
    builder
        .body(body)
        .map_err(|e| AppError::Internal(format!("failed to build response: {}", e)))
}

/// Apply routing then rewriting to a validated request
///
/// Routing runs only when the requested model is a routing alias. Rewriting runs
/// only when the (possibly routed) model has a rewrite rule.
pub fn prepare(state: &AppState, mut request: ChatRequest, request_id: RequestId) -> ChatRequest {
    let config = state.config();

    if let Some(rule) = config.routing_rule(request.model()) {
        let estimated_tokens = state.estimator().estimate(&request.prompt_text());
        let decision = RoutingDecision::evaluate(request.model(), rule, estimated_tokens);

        tracing::info!(
            request_id = %request_id,
            alias = %decision.alias,
            target_model = %decision.target,
            estimated_tokens = decision.estimated_tokens,
            context_length = decision.context_length,
            overflowed = decision.overflowed,
            "Routing decision made"
        );
        if decision.overflowed {
            tracing::warn!(
                request_id = %request_id,
                alias = %decision.alias,
                estimated_tokens = decision.estimated_tokens,
                "Prompt exceeds every bucket, using the largest context"
            );
        }
        if let Err(e) = state.metrics().record_routing_decision(
            &decision.alias,
            &decision.target,
            decision.estimated_tokens,
        ) {
            tracing::warn!(error = %e, "Failed to record routing decision metric");
        }

        request.set_model(decision.target);
    }

    let model = request.model().to_string();
    if let Some(rule) = config.rewrite_rule(&model) {
        request = rule.apply(request);

        tracing::debug!(
            request_id = %request_id,
            alias = %model,
            target_model = %request.model(),
            overrides = rule.overrides().len(),
            injected_messages = rule.messages().len(),
            injected_tools = rule.tools().len(),
            "Rewrite rule applied"
        );
        if let Err(e) = state.metrics().record_rewrite(&model) {
            tracing::warn!(error = %e, "Failed to record rewrite metric");
        }
    }

    request
}
