//! Configuration management for the rewrite router
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Routing and rewrite rules validate themselves while being deserialized; the
//! remaining cross-field checks live in [`Config::validate`].

use crate::error::{AppError, AppResult};
use crate::rewrite::RewriteRule;
use crate::router::{Encoding, RoutingRule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for every backend timeout, in seconds
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Context-length routing rules keyed by alias
    #[serde(default)]
    pub routing: BTreeMap<String, RoutingRule>,
    /// Rewrite rules keyed by model name (alias or routed target)
    #[serde(default)]
    pub rewrite: BTreeMap<String, RewriteRule>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest inbound body accepted on the chat route
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3034
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

/// Backend (upstream) configuration
///
/// Fields are private; read them through the accessors so the trailing-slash
/// normalisation of `base_url` is applied everywhere.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    base_url: String,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_seconds: u64,
    /// Maximum idle time between two reads of the upstream response
    #[serde(default = "default_read_timeout")]
    read_timeout_seconds: u64,
    /// Total time allowed for the `/v1/models` catalog fetch
    #[serde(default = "default_models_timeout")]
    models_timeout_seconds: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    300
}

fn default_models_timeout() -> u64 {
    30
}

impl BackendConfig {
    /// Get the backend base URL, without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Join the base URL with an absolute path (and optional query)
    pub fn url_for(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.base_url(), path_and_query)
        } else {
            format!("{}/{}", self.base_url(), path_and_query)
        }
    }

    /// URL of the backend chat completions endpoint
    pub fn chat_completions_url(&self) -> String {
        self.url_for("/v1/chat/completions")
    }

    /// URL of the backend model catalog
    pub fn models_url(&self) -> String {
        self.url_for("/v1/models")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    pub fn models_timeout(&self) -> Duration {
        Duration::from_secs(self.models_timeout_seconds)
    }
}

/// Token estimation configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub encoding: Encoding,
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML; rule-level validation happens here
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: Cross-field validation
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Validate configuration after parsing
    ///
    /// Called by `from_file()` and `from_str()`; call it explicitly when building a
    /// `Config` by other means (e.g., `toml::from_str` in tests).
    pub fn validate(&self) -> AppResult<()> {
        let base_url = self.backend.base_url();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "backend.base_url '{}' must start with 'http://' or 'https://'",
                base_url
            )));
        }
        let parsed = reqwest::Url::parse(base_url).map_err(|e| {
            AppError::Config(format!("backend.base_url '{}' is invalid: {}", base_url, e))
        })?;
        // Error messages include the target URL, so it must never carry secrets
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(AppError::Config(
                "backend.base_url must not contain credentials; clients supply the \
                Authorization header"
                    .to_string(),
            ));
        }
        if parsed.query().is_some() {
            return Err(AppError::Config(format!(
                "backend.base_url '{}' must not contain a query string",
                base_url
            )));
        }

        for (name, value) in [
            (
                "connect_timeout_seconds",
                self.backend.connect_timeout_seconds,
            ),
            ("read_timeout_seconds", self.backend.read_timeout_seconds),
            ("models_timeout_seconds", self.backend.models_timeout_seconds),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!(
                    "backend.{} must be greater than 0",
                    name
                )));
            }
            if value > MAX_TIMEOUT_SECONDS {
                return Err(AppError::Config(format!(
                    "backend.{} cannot exceed {} seconds, got {}",
                    name, MAX_TIMEOUT_SECONDS, value
                )));
            }
        }

        if self.server.max_body_bytes == 0 {
            return Err(AppError::Config(
                "server.max_body_bytes must be greater than 0".to_string(),
            ));
        }

        for alias in self.routing.keys().chain(self.rewrite.keys()) {
            if alias.trim().is_empty() {
                return Err(AppError::Config(
                    "routing and rewrite aliases cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Routing rule for `alias`, if one is configured
    pub fn routing_rule(&self, alias: &str) -> Option<&RoutingRule> {
        self.routing.get(alias)
    }

    /// Rewrite rule for `model`, if one is configured
    pub fn rewrite_rule(&self, model: &str) -> Option<&RewriteRule> {
        self.rewrite.get(model)
    }

    /// Model names advertised in the catalog in addition to the backend's own
    ///
    /// Routing aliases come first, then rewrite aliases, each in sorted order.
    /// Duplicates are left for the catalog merge to drop.
    pub fn virtual_aliases(&self) -> impl Iterator<Item = &str> {
        self.routing
            .keys()
            .chain(self.rewrite.keys())
            .map(String::as_str)
    }

    /// Routing aliases whose selected targets have a rewrite rule keyed by the alias
    /// itself. Such rewrite rules can never fire, because routing replaces the
    /// alias before the rewrite lookup.
    pub fn shadowed_rewrite_aliases(&self) -> Vec<&str> {
        self.routing
            .iter()
            .filter(|(alias, rule)| {
                self.rewrite.contains_key(alias.as_str())
                    && !rule.buckets().iter().any(|b| &b.model == *alias)
            })
            .map(|(alias, _)| alias.as_str())
            .collect()
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
