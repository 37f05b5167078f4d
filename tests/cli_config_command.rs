//! Integration tests for the `config` subcommand
//!
//! The generated template must load through the same path the server uses.

use rewrite_router::cli::generate_config_template;
use rewrite_router::config::Config;
use rewrite_router::router::Encoding;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_generated_template_creates_valid_config_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");

    fs::write(&config_path, generate_config_template()).expect("Failed to write template");

    let config =
        Config::from_file(&config_path).expect("Generated template should load as valid Config");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.backend.base_url(), "http://localhost:3000");
    assert_eq!(config.tokenizer.encoding, Encoding::Cl100kBase);
    assert_eq!(config.routing.len(), 1);
    assert!(config.shadowed_rewrite_aliases().is_empty());
}

#[test]
fn test_template_documents_every_section() {
    let template = generate_config_template();
    for section in [
        "[server]",
        "[backend]",
        "[tokenizer]",
        "[routing.",
        "[rewrite.",
        "[observability]",
    ] {
        assert!(template.contains(section), "Missing {}", section);
    }
}

#[test]
fn test_template_rules_behave_as_documented() {
    let config: Config = generate_config_template().parse().unwrap();

    let routing = config.routing_rule("gpt-4o-auto").unwrap();
    assert_eq!(routing.resolve(5000), "gpt-4o-8k");
    assert_eq!(routing.resolve(6000), "gpt-4o-2024-08-06");

    let thinking = config
        .rewrite_rule("claude-3-7-sonnet-20250219-thinking")
        .unwrap();
    assert_eq!(thinking.model_override(), Some("claude-3-7-sonnet-20250219"));
}
