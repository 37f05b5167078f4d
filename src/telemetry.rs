//! Telemetry setup
//!
//! Structured logging with tracing and tracing-subscriber.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Build the default filter directive for a configured log level
pub fn default_directive(level: &str) -> String {
    format!("rewrite_router={},tower_http={}", level, level)
}

/// Initialize the tracing subscriber
///
/// Only the first call per process has an effect. `RUST_LOG` takes precedence over
/// `default_level` (the `[observability] log_level` setting).
///
/// ```no_run
/// rewrite_router::telemetry::init("info");
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(default_level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
