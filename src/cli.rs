//! Command-line interface
//!
//! Argument parsing and subcommand handling for the `rewrite-router` binary.

use clap::{Parser, Subcommand};

/// Context-aware routing and rewriting proxy for chat-completion backends
#[derive(Parser)]
#[command(name = "rewrite-router")]
#[command(version)]
#[command(about = "Context-aware routing and rewriting proxy for chat-completion backends")]
#[command(
    long_about = "rewrite-router sits in front of an OpenAI-compatible backend. It picks a \
    concrete model for routing aliases based on the estimated prompt size, applies \
    configured rewrite rules, and streams the backend's answer back to the caller."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    /// Override `server.host` from the configuration file
    #[arg(long)]
    pub host: Option<String>,

    /// Override `server.port` from the configuration file
    #[arg(short, long)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# rewrite-router configuration
# =============================

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# Address to bind (0.0.0.0 for all interfaces)
host = "127.0.0.1"
port = 3034

# Largest chat request body accepted, in bytes
max_body_bytes = 52428800

# ─────────────────────────────────────────────────────────────────────────────
# BACKEND
# ─────────────────────────────────────────────────────────────────────────────
#
# OpenAI-compatible server that receives every request. Do not put credentials
# in the URL; the client's Authorization header is forwarded as is.

[backend]
base_url = "http://localhost:3000"
connect_timeout_seconds = 10
# Maximum idle time between two reads of a (streamed) response
read_timeout_seconds = 300
# Total time allowed for the /v1/models catalog fetch
models_timeout_seconds = 30

# ─────────────────────────────────────────────────────────────────────────────
# TOKEN ESTIMATION
# ─────────────────────────────────────────────────────────────────────────────

[tokenizer]
# "cl100k_base" (exact BPE count) or "chars_div_4" (characters / 4)
encoding = "cl100k_base"

# ─────────────────────────────────────────────────────────────────────────────
# ROUTING
# ─────────────────────────────────────────────────────────────────────────────
#
# A request for a routing alias is sent to the smallest bucket whose
# context_length * threshold still holds the estimated prompt. Prompts larger
# than every bucket go to the largest one.

[routing."gpt-4o-auto"]
threshold = 0.65
buckets = [
  { context_length = 8192, model = "gpt-4o-8k" },
  { context_length = 131072, model = "gpt-4o-2024-08-06" },
]

# ─────────────────────────────────────────────────────────────────────────────
# REWRITE RULES
# ─────────────────────────────────────────────────────────────────────────────
#
# Applied to the model name after routing, in this order:
#   1. overrides: set top-level fields (last one wins; may rename "model")
#   2. messages:  prepended ahead of the client's messages
#   3. tools:     appended to the request's "tools" list

[rewrite."yi-lightning"]
overrides = [{ field = "max_tokens", value = 5000 }]

[rewrite."claude-3-7-sonnet-20250219-thinking"]
overrides = [
  { field = "model", value = "claude-3-7-sonnet-20250219" },
  { field = "thinking", value = { type = "enabled", budget_tokens = 8192 } },
]

[rewrite."gemini-2.0-flash-search"]
overrides = [{ field = "model", value = "gemini-2.0-flash" }]
tools = [{ googleSearch = {} }]

[rewrite."model-with-sys-prompts"]
messages = [{ role = "system", content = "You are ChatGPT." }]

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# "trace", "debug", "info", "warn" or "error" (RUST_LOG takes precedence)
log_level = "info"
"#
}
