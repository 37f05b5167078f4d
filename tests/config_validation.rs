//! Configuration loading tests
//!
//! Covers the three loading phases (read, parse, validate) and the error context
//! each one preserves.

use rewrite_router::config::Config;
use rewrite_router::error::AppError;
use std::error::Error;
use std::fs;
use std::str::FromStr;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, content).expect("Failed to write config");
    path
}

#[test]
fn test_minimal_file_loads_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[backend]\nbase_url = \"http://localhost:3000\"\n");

    let config = Config::from_file(&path).expect("minimal config should load");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3034);
    assert_eq!(config.backend.models_timeout().as_secs(), 30);
    assert_eq!(config.virtual_aliases().count(), 0);
}

#[test]
fn test_missing_file_preserves_io_error() {
    let err = Config::from_file("/nonexistent/path/to/config.toml").unwrap_err();

    assert!(matches!(err, AppError::ConfigFileRead { .. }));
    assert!(err.to_string().contains("/nonexistent/path/to/config.toml"));
    let source = err.source().expect("should have source error");
    assert!(source.is::<std::io::Error>());
}

#[test]
fn test_invalid_toml_preserves_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "this is [[[[ not valid toml");

    let err = Config::from_file(&path).unwrap_err();
    assert!(matches!(err, AppError::ConfigParseFailed { .. }));
    let source = err.source().expect("should have source error");
    assert!(source.is::<toml::de::Error>());
}

#[test]
fn test_invalid_rule_reported_with_file_path() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[backend]
base_url = "http://localhost:3000"

[routing."auto"]
threshold = 0.5
buckets = [
  { context_length = 4096, model = "a" },
  { context_length = 4096, model = "b" },
]
"#,
    );

    let err = Config::from_file(&path).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("config.toml"), "message: {}", message);
    assert!(message.contains("duplicate context_length 4096"), "message: {}", message);
}

#[test]
fn test_cross_field_failure_is_validation_phase() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "[backend]\nbase_url = \"http://localhost:3000\"\nmodels_timeout_seconds = 0\n",
    );

    let err = Config::from_file(&path).unwrap_err();
    match err {
        AppError::ConfigValidationFailed { path: p, reason } => {
            assert!(p.ends_with("config.toml"));
            assert!(reason.contains("models_timeout_seconds"));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[test]
fn test_unknown_rule_keys_rejected() {
    let result = Config::from_str(
        r#"
[backend]
base_url = "http://localhost:3000"

[rewrite."x"]
override = [{ field = "max_tokens", value = 1 }]
"#,
    );
    assert!(result.is_err(), "misspelled 'overrides' should be rejected");
}

#[test]
fn test_unknown_encoding_rejected() {
    let result = Config::from_str(
        "[backend]\nbase_url = \"http://localhost:3000\"\n[tokenizer]\nencoding = \"o200k\"\n",
    );
    assert!(result.is_err());
}

#[test]
fn test_rules_keep_declared_values() {
    let config = Config::from_str(
        r#"
[backend]
base_url = "https://api.example.com"

[routing."Qwen/Qwen2.5-72B-Instruct-auto"]
threshold = 0.7
buckets = [
  { context_length = 131072, model = "Qwen/Qwen2.5-72B-Instruct-128K" },
  { context_length = 32768, model = "Qwen/Qwen2.5-72B-Instruct" },
]

[rewrite."gemini-2.0-flash-search"]
overrides = [{ field = "model", value = "gemini-2.0-flash" }]
tools = [{ googleSearch = {} }]
"#,
    )
    .unwrap();

    let rule = config
        .routing_rule("Qwen/Qwen2.5-72B-Instruct-auto")
        .unwrap();
    assert_eq!(rule.threshold(), 0.7);
    assert_eq!(rule.resolve(20000), "Qwen/Qwen2.5-72B-Instruct");
    assert_eq!(rule.resolve(30000), "Qwen/Qwen2.5-72B-Instruct-128K");

    let rewrite = config.rewrite_rule("gemini-2.0-flash-search").unwrap();
    assert_eq!(rewrite.model_override(), Some("gemini-2.0-flash"));
    assert_eq!(rewrite.tools().len(), 1);
}
