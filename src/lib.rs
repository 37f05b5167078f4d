//! rewrite-router: context-aware model routing and request rewriting for
//! OpenAI-compatible chat-completion backends
//!
//! A chat request for a routing alias is sent to the smallest configured model
//! whose context window comfortably holds the prompt. The resulting model name can
//! then be rewritten (field overrides, injected system messages, injected tools)
//! before the request is streamed to the backend. Everything else is passed
//! through.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod rewrite;
pub mod router;
pub mod telemetry;
pub mod types;
pub mod upstream;
