//! Shared helpers for integration tests

#![allow(dead_code)]

use axum::{Router, body::Body, http::Response};
use rewrite_router::{
    config::Config,
    handlers::{self, AppState},
};
use std::str::FromStr;
use std::sync::Arc;

/// Routing and rewrite rules used across the HTTP tests
///
/// Token estimates use `chars_div_4` so prompt sizes are easy to reason about.
pub const RULES: &str = r#"
[tokenizer]
encoding = "chars_div_4"

[routing."gpt-4o-auto"]
threshold = 0.65
buckets = [
  { context_length = 8192, model = "gpt-4o-8k" },
  { context_length = 131072, model = "gpt-4o-2024-08-06" },
]

[rewrite."yi-lightning"]
overrides = [{ field = "max_tokens", value = 5000 }]

[rewrite."claude-3-7-sonnet-20250219-thinking"]
overrides = [
  { field = "model", value = "claude-3-7-sonnet-20250219" },
  { field = "thinking", value = { type = "enabled", budget_tokens = 8192 } },
]

[rewrite."model-with-sys-prompts"]
messages = [{ role = "system", content = "You are ChatGPT." }]

[rewrite."gemini-2.0-flash-search"]
overrides = [{ field = "model", value = "gemini-2.0-flash" }]
tools = [{ googleSearch = {} }]
"#;

pub fn config_for(base_url: &str) -> Config {
    Config::from_str(&format!(
        "[backend]\nbase_url = \"{}\"\nconnect_timeout_seconds = 2\n{}",
        base_url, RULES
    ))
    .expect("test config should parse")
}

pub fn state_for(base_url: &str) -> AppState {
    AppState::new(Arc::new(config_for(base_url))).expect("AppState::new should succeed")
}

/// Full application against the given backend
pub fn app_for(base_url: &str) -> Router {
    handlers::app(state_for(base_url))
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    String::from_utf8(bytes.to_vec()).expect("body should be UTF-8")
}
