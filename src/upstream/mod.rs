//! Outbound calls to the configured backend
//!
//! One reqwest client is shared by all requests. Every call opens (or reuses from
//! the pool) one connection per inbound request, and response bodies are handed
//! back unread so the handlers can stream them.

pub mod stream;

pub use stream::{TrackedStream, frame_sse_lines};

use crate::config::BackendConfig;
use crate::error::{AppError, AppResult};
use crate::types::ChatRequest;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, header};
use futures::StreamExt;
use serde_json::Value;

/// Largest slice of an error body quoted back to the client
pub const MAX_ERROR_EXCERPT_BYTES: usize = 1024;

/// Connection-scoped headers that must not cross a proxy
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// HTTP client bound to one backend
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    backend: BackendConfig,
}

impl UpstreamClient {
    /// Build a client with the backend's connect and read timeouts
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the TLS backend cannot be initialised.
    pub fn new(backend: &BackendConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(backend.connect_timeout())
            .read_timeout(backend.read_timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            backend: backend.clone(),
        })
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    /// POST a chat completion request
    ///
    /// Only `Authorization` and `Content-Type: application/json` are sent. The
    /// response body is returned unread. A non-streaming request gets the backend
    /// response whatever its status; a streaming request only ever gets a 2xx.
    ///
    /// # Errors
    ///
    /// - `AppError::UpstreamConnectivity` on transport failure or timeout
    /// - `AppError::UpstreamStatus` on a non-2xx answer to a streaming request
    pub async fn send_chat(
        &self,
        request: &ChatRequest,
        authorization: Option<&HeaderValue>,
    ) -> AppResult<reqwest::Response> {
        let url = self.backend.chat_completions_url();
        let body = serde_json::to_vec(request).map_err(|e| {
            AppError::Internal(format!("failed to serialize chat request: {}", e))
        })?;

        let mut builder = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(auth) = authorization {
            builder = builder.header(header::AUTHORIZATION, auth.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        if request.is_stream() {
            ensure_success(&url, response).await
        } else {
            Ok(response)
        }
    }

    /// GET the backend model catalog as raw JSON
    ///
    /// # Errors
    ///
    /// - `AppError::UpstreamConnectivity` on transport failure or timeout
    /// - `AppError::UpstreamStatus` on a non-2xx answer
    /// - `AppError::UpstreamProtocol` if the body is not JSON
    pub async fn fetch_models(&self, authorization: Option<&HeaderValue>) -> AppResult<Value> {
        let url = self.backend.models_url();

        let mut builder = self
            .client
            .get(&url)
            .timeout(self.backend.models_timeout());
        if let Some(auth) = authorization {
            builder = builder.header(header::AUTHORIZATION, auth.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let response = ensure_success(&url, response).await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&url, e))?;
        serde_json::from_slice(&body).map_err(|e| AppError::UpstreamProtocol {
            url: url.clone(),
            reason: format!("catalog is not valid JSON: {}", e),
        })
    }

    /// Forward an arbitrary request to `{base_url}{path_and_query}`
    ///
    /// Host and hop-by-hop headers are removed before sending. The response is
    /// returned whatever its status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UpstreamConnectivity` on transport failure or timeout.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: reqwest::Body,
    ) -> AppResult<reqwest::Response> {
        let url = self.backend.url_for(path_and_query);
        self.client
            .request(method, &url)
            .headers(forwardable_request_headers(headers))
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))
    }
}

/// Map a reqwest transport error; the URL is reported separately
fn transport_error(url: &str, error: reqwest::Error) -> AppError {
    let reason = if error.is_timeout() {
        format!("request timed out ({})", error.without_url())
    } else if error.is_connect() {
        format!("connection failed ({})", error.without_url())
    } else {
        error.without_url().to_string()
    };
    AppError::UpstreamConnectivity {
        url: url.to_string(),
        reason,
    }
}

/// Pass 2xx responses through; turn anything else into `UpstreamStatus`
async fn ensure_success(url: &str, response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(AppError::UpstreamStatus {
        url: url.to_string(),
        status: status.as_u16(),
        detail: read_excerpt(response).await,
    })
}

/// Read at most [`MAX_ERROR_EXCERPT_BYTES`] of a response body as text
pub async fn read_excerpt(response: reqwest::Response) -> String {
    let mut body = response.bytes_stream();
    let mut buffer = Vec::new();
    while let Some(Ok(chunk)) = body.next().await {
        buffer.extend_from_slice(&chunk);
        if buffer.len() >= MAX_ERROR_EXCERPT_BYTES {
            break;
        }
    }
    let truncated = buffer.len() > MAX_ERROR_EXCERPT_BYTES;
    buffer.truncate(MAX_ERROR_EXCERPT_BYTES);

    let text = String::from_utf8_lossy(&buffer).trim().to_string();
    match (text.is_empty(), truncated) {
        (true, _) => "<empty body>".to_string(),
        (false, true) => format!("{}...", text),
        (false, false) => text,
    }
}

/// Names listed in a `Connection` header are hop-by-hop for that message
fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Headers of an inbound request that may be sent to the backend
pub fn forwardable_request_headers(headers: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(headers);
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name == header::HOST || is_hop_by_hop(name) || listed.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Headers of a backend response that may be sent to the client
///
/// `content-length` is dropped as well because the body is re-streamed.
pub fn forwardable_response_headers(headers: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(headers);
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name == header::CONTENT_LENGTH || is_hop_by_hop(name) || listed.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// True if a content type denotes a server-sent event stream
pub fn is_event_stream(content_type: Option<&HeaderValue>) -> bool {
    content_type
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/event-stream"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_request_headers_drop_host_and_hop_by_hop() {
        let inbound = headers(&[
            ("host", "proxy.local:3034"),
            ("authorization", "Bearer sk-test"),
            ("connection", "keep-alive, x-trace-hop"),
            ("keep-alive", "timeout=5"),
            ("x-trace-hop", "1"),
            ("transfer-encoding", "chunked"),
            ("content-type", "application/json"),
            ("x-custom", "a"),
            ("x-custom", "b"),
        ]);
        let out = forwardable_request_headers(&inbound);

        assert!(out.get("host").is_none());
        assert!(out.get("connection").is_none());
        assert!(out.get("keep-alive").is_none());
        assert!(out.get("x-trace-hop").is_none());
        assert!(out.get("transfer-encoding").is_none());
        assert_eq!(out.get("authorization").unwrap(), "Bearer sk-test");
        assert_eq!(out.get_all("x-custom").iter().count(), 2);
    }

    #[test]
    fn test_response_headers_drop_content_length() {
        let upstream = headers(&[
            ("content-length", "42"),
            ("content-type", "application/json"),
            ("transfer-encoding", "chunked"),
            ("x-ratelimit-remaining", "9"),
        ]);
        let out = forwardable_response_headers(&upstream);
        assert!(out.get("content-length").is_none());
        assert!(out.get("transfer-encoding").is_none());
        assert_eq!(out.get("content-type").unwrap(), "application/json");
        assert_eq!(out.get("x-ratelimit-remaining").unwrap(), "9");
    }

    #[test]
    fn test_event_stream_detection() {
        let sse = HeaderValue::from_static("text/event-stream; charset=utf-8");
        let json = HeaderValue::from_static("application/json");
        assert!(is_event_stream(Some(&sse)));
        assert!(is_event_stream(Some(&HeaderValue::from_static("Text/Event-Stream"))));
        assert!(!is_event_stream(Some(&json)));
        assert!(!is_event_stream(None));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_connectivity_error() {
        let backend: BackendConfig = toml::from_str(
            "base_url = \"http://127.0.0.1:1\"\nconnect_timeout_seconds = 2\n",
        )
        .unwrap();
        let client = UpstreamClient::new(&backend).unwrap();
        let err = client.fetch_models(None).await.unwrap_err();
        match err {
            AppError::UpstreamConnectivity { url, .. } => {
                assert_eq!(url, "http://127.0.0.1:1/v1/models");
            }
            other => panic!("expected connectivity error, got {:?}", other),
        }
    }
}
