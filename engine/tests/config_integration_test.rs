//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be loaded from disk,
//! validated, and processed with path expansion.

use docia_engine::conductor::QueryMode;
use docia_engine::config::Config;
use sdk::errors::DociaError;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_config_toml_parsing() {
    let toml_content = r#"
[core]
log_level = "debug"
documents_dir = "/srv/docia/documents"

[llm]
provider = "openai"
model = "gpt-4o"
vision_model = "gpt-4o"
input_cost_per_1k = 0.0025
output_cost_per_1k = 0.01
request_timeout_secs = 60
max_tokens = 1024

[query]
max_pages = 4
max_iterations = 2
mode = "fast"
conversation_turns = 1

[planner]
max_tasks = 3
max_retries = 1

[executor]
worker_pool_width = 5
max_attempts = 2
base_delay_ms = 100
max_delay_ms = 1000

[sufficiency]
min_completion_ratio = 0.75
min_term_coverage = 0.5

[memory]
max_turns = 4
"#;

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, toml_content).unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.core.log_level, "debug");
    assert_eq!(
        config.core.documents_dir.to_str(),
        Some("/srv/docia/documents")
    );
    assert_eq!(config.llm.provider, "openai");
    assert_eq!(config.llm.resolved_base_url(), "https://api.openai.com/v1");
    assert_eq!(config.query.mode, QueryMode::Fast);
    assert_eq!(config.planner.max_tasks, 3);
    assert_eq!(config.executor.worker_pool_width, 5);

    let retry = config.executor.retry_policy();
    assert_eq!(retry.max_attempts, 2);
    assert_eq!(retry.base_delay.as_millis(), 100);

    let policy = config.sufficiency.policy();
    assert_eq!(policy.min_completion_ratio, 0.75);
    assert_eq!(config.memory.max_turns, 4);
}

#[test]
fn test_empty_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, "").unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.llm.provider, "openrouter");
    assert_eq!(config.llm.resolved_base_url(), "https://openrouter.ai/api/v1");
    assert_eq!(config.llm.api_key_var(), "OPENROUTER_API_KEY");
    assert_eq!(config.query.max_pages, 6);

    // ~ is expanded on load
    let home = dirs::home_dir().unwrap();
    assert_eq!(config.core.documents_dir, home.join(".docia").join("documents"));
}

#[test]
fn test_invalid_values_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");

    fs::write(&path, "[query]\nmax_pages = 0\n").unwrap();
    assert!(matches!(
        Config::load_from_path(&path),
        Err(DociaError::Config(msg)) if msg.contains("max_pages")
    ));

    fs::write(&path, "[core]\nlog_level = \"loud\"\n").unwrap();
    assert!(matches!(
        Config::load_from_path(&path),
        Err(DociaError::Config(msg)) if msg.contains("log level")
    ));

    fs::write(&path, "[query\nmax_pages = 3\n").unwrap();
    assert!(matches!(
        Config::load_from_path(&path),
        Err(DociaError::Config(msg)) if msg.contains("parse")
    ));
}

#[test]
fn test_missing_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = Config::load_from_path(&temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(DociaError::Config(_))));
}

#[test]
fn test_written_defaults_load_back() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, toml::to_string_pretty(&Config::default()).unwrap()).unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.query.max_iterations, 5);
    assert_eq!(config.planner.max_retries, 2);
    assert_eq!(config.executor.max_delay_ms, 8000);
}
