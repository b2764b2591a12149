//! Configuration management
//!
//! This module handles loading, validation, and management of the Docia configuration.
//! Configuration is stored in TOML format at ~/.docia/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, documents directory
//! - **llm**: Model provider, models, pricing and request limits
//! - **query**: Per-query defaults (page and iteration ceilings, mode)
//! - **planner**: Task cap and corrective retries
//! - **executor**: Worker pool width and retry backoff
//! - **sufficiency**: Thresholds of the sufficiency heuristic
//! - **memory**: Conversation memory depth
//!
//! Every section is optional; missing values take their defaults.
//!
//! # Environment Overrides
//!
//! After the file is parsed, these variables override it:
//! `DOCIA_PROVIDER`, `DOCIA_MODEL`, `DOCIA_VISION_MODEL`,
//! `DOCIA_MAX_AGENT_ITERATIONS`, `DOCIA_MAX_PAGES_PER_TASK`,
//! `DOCIA_MAX_TASKS_PER_PLAN`, `DOCIA_MAX_CONVERSATION_TURNS`,
//! `DOCIA_LOG_LEVEL`.
//!
//! # Examples
//!
//! ```no_run
//! use docia_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default location
//! let config = Config::load_or_create()?;
//!
//! // Access configuration values
//! println!("Documents: {:?}", config.core.documents_dir);
//! println!("Provider: {}", config.llm.provider);
//! # Ok(())
//! # }
//! ```

use crate::conductor::executor::RetryPolicy;
use crate::conductor::types::{QueryContext, QueryMode};
use crate::conductor::HeuristicSufficiency;
use sdk::errors::DociaError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Supported model providers
pub const PROVIDERS: [&str; 2] = ["openai", "openrouter"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Model provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Per-query defaults
    #[serde(default)]
    pub query: QueryConfig,

    /// Planner settings
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Task executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Sufficiency thresholds
    #[serde(default)]
    pub sufficiency: SufficiencyConfig,

    /// Conversation memory settings
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory of pre-rasterized documents (supports ~ expansion)
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider (openai, openrouter)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Override of the provider's API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model used for planning and synthesis
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for page analysis
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Environment variable holding the API key
    /// (defaults to OPENAI_API_KEY or OPENROUTER_API_KEY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// USD per 1k prompt tokens, used when the provider reports no cost
    #[serde(default)]
    pub input_cost_per_1k: f64,

    /// USD per 1k completion tokens, used when the provider reports no cost
    #[serde(default)]
    pub output_cost_per_1k: f64,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Completion token limit per request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Per-query defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Page ceiling per task
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Iteration ceiling per query
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// fast or comprehensive
    #[serde(default)]
    pub mode: QueryMode,

    /// Prior turns passed to the planner and the page analysis prompts
    #[serde(default = "default_conversation_turns")]
    pub conversation_turns: usize,

    /// Rewrite follow-up questions into standalone ones before planning
    #[serde(default = "default_true")]
    pub reformulate: bool,
}

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Maximum tasks per plan
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,

    /// Corrective re-prompts after unusable output
    #[serde(default = "default_planning_retries")]
    pub max_retries: u32,
}

/// Task executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Tasks running at once
    #[serde(default = "default_worker_pool_width")]
    pub worker_pool_width: usize,

    /// Attempts per task, the first call included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Sufficiency heuristic thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SufficiencyConfig {
    #[serde(default = "default_min_completion_ratio")]
    pub min_completion_ratio: f64,

    #[serde(default = "default_min_term_coverage")]
    pub min_term_coverage: f64,
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Turns kept per session
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("~/.docia/documents")
}

fn default_provider() -> String {
    "openrouter".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o".to_string()
}

fn default_vision_model() -> String {
    "google/gemini-2.5-flash".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_max_pages() -> usize {
    6
}

fn default_max_iterations() -> u32 {
    5
}

fn default_conversation_turns() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_max_tasks() -> usize {
    4
}

fn default_planning_retries() -> u32 {
    2
}

fn default_worker_pool_width() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_min_completion_ratio() -> f64 {
    0.5
}

fn default_min_term_coverage() -> f64 {
    0.3
}

fn default_max_turns() -> usize {
    8
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            documents_dir: default_documents_dir(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            model: default_model(),
            vision_model: default_vision_model(),
            api_key_env: None,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
            request_timeout_secs: default_request_timeout(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_iterations: default_max_iterations(),
            mode: QueryMode::default(),
            conversation_turns: default_conversation_turns(),
            reformulate: default_true(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_tasks: default_max_tasks(),
            max_retries: default_planning_retries(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_pool_width: default_worker_pool_width(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for SufficiencyConfig {
    fn default() -> Self {
        Self {
            min_completion_ratio: default_min_completion_ratio(),
            min_term_coverage: default_min_term_coverage(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

impl LLMConfig {
    /// API base URL, from the override or the provider default
    pub fn resolved_base_url(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        match self.provider.as_str() {
            "openai" => "https://api.openai.com/v1".to_string(),
            _ => "https://openrouter.ai/api/v1".to_string(),
        }
    }

    /// Name of the environment variable holding the API key
    pub fn api_key_var(&self) -> String {
        if let Some(var) = &self.api_key_env {
            return var.clone();
        }
        match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY".to_string(),
            _ => "OPENROUTER_API_KEY".to_string(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ExecutorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl SufficiencyConfig {
    pub fn policy(&self) -> HeuristicSufficiency {
        HeuristicSufficiency {
            min_completion_ratio: self.min_completion_ratio,
            min_term_coverage: self.min_term_coverage,
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.docia/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - An environment override is malformed
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, DociaError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, DociaError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| DociaError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| DociaError::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, DociaError> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DociaError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // The file keeps the plain defaults; overrides only apply in memory
        let toml_string = toml::to_string_pretty(&Self::default())
            .map_err(|e| DociaError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| DociaError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.docia/config.toml)
    pub fn default_config_path() -> Result<PathBuf, DociaError> {
        let home = dirs::home_dir()
            .ok_or_else(|| DociaError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".docia").join("config.toml"))
    }

    /// Apply DOCIA_* overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), DociaError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply DOCIA_* overrides from an arbitrary lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), DociaError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DOCIA_PROVIDER") {
            self.llm.provider = v.trim().to_lowercase();
        }
        if let Some(v) = lookup("DOCIA_MODEL") {
            self.llm.model = v.trim().to_string();
        }
        if let Some(v) = lookup("DOCIA_VISION_MODEL") {
            self.llm.vision_model = v.trim().to_string();
        }
        if let Some(v) = lookup("DOCIA_MAX_AGENT_ITERATIONS") {
            self.query.max_iterations = parse_override("DOCIA_MAX_AGENT_ITERATIONS", &v)?;
        }
        if let Some(v) = lookup("DOCIA_MAX_PAGES_PER_TASK") {
            self.query.max_pages = parse_override("DOCIA_MAX_PAGES_PER_TASK", &v)?;
        }
        if let Some(v) = lookup("DOCIA_MAX_TASKS_PER_PLAN") {
            self.planner.max_tasks = parse_override("DOCIA_MAX_TASKS_PER_PLAN", &v)?;
        }
        if let Some(v) = lookup("DOCIA_MAX_CONVERSATION_TURNS") {
            self.memory.max_turns = parse_override("DOCIA_MAX_CONVERSATION_TURNS", &v)?;
        }
        if let Some(v) = lookup("DOCIA_LOG_LEVEL") {
            self.core.log_level = v.trim().to_lowercase();
        }
        Ok(())
    }

    /// Default query context for `query`
    pub fn query_context(&self, query: impl Into<String>) -> QueryContext {
        QueryContext::new(query)
            .with_mode(self.query.mode)
            .with_max_pages(self.query.max_pages)
            .with_max_iterations(self.query.max_iterations)
            .with_conversation_turns(self.query.conversation_turns)
    }

    /// Validate and process configuration
    ///
    /// Checks enumerations and ranges, then expands `~` in the documents
    /// directory.
    pub fn validate_and_process(&mut self) -> Result<(), DociaError> {
        // Validate log level
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(DociaError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        // Validate provider
        if !PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(DociaError::Config(format!(
                "Invalid provider '{}'. Must be one of: {}",
                self.llm.provider,
                PROVIDERS.join(", ")
            )));
        }

        if self.llm.model.trim().is_empty() || self.llm.vision_model.trim().is_empty() {
            return Err(DociaError::Config("Model names must not be empty".to_string()));
        }
        if self.llm.input_cost_per_1k < 0.0 || self.llm.output_cost_per_1k < 0.0 {
            return Err(DociaError::Config("Token prices must not be negative".to_string()));
        }
        if self.llm.request_timeout_secs == 0 {
            return Err(DociaError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }

        // Validate ceilings
        if self.query.max_pages == 0 {
            return Err(DociaError::Config("max_pages must be at least 1".to_string()));
        }
        if self.query.max_iterations == 0 {
            return Err(DociaError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.planner.max_tasks == 0 {
            return Err(DociaError::Config("max_tasks must be at least 1".to_string()));
        }
        if self.executor.worker_pool_width == 0 {
            return Err(DociaError::Config(
                "worker_pool_width must be at least 1".to_string(),
            ));
        }
        if self.executor.max_attempts == 0 {
            return Err(DociaError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.executor.base_delay_ms > self.executor.max_delay_ms {
            return Err(DociaError::Config(
                "base_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }
        if self.memory.max_turns == 0 {
            return Err(DociaError::Config("max_turns must be at least 1".to_string()));
        }

        // Validate thresholds
        for (name, value) in [
            ("min_completion_ratio", self.sufficiency.min_completion_ratio),
            ("min_term_coverage", self.sufficiency.min_term_coverage),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DociaError::Config(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        self.core.documents_dir = expand_path(&self.core.documents_dir)?;

        Ok(())
    }
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T, DociaError> {
    value.trim().parse().map_err(|_| {
        DociaError::Config(format!("{} must be a non-negative integer, got '{}'", key, value))
    })
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, DociaError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| DociaError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| DociaError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| DociaError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.provider, "openrouter");
        assert_eq!(config.query.max_pages, 6);
        assert_eq!(config.query.max_iterations, 5);
        assert_eq!(config.query.conversation_turns, 3);
        assert!(config.query.reformulate);
        assert_eq!(config.planner.max_tasks, 4);
        assert_eq!(config.planner.max_retries, 2);
        assert_eq!(config.executor.worker_pool_width, 3);
        assert_eq!(config.memory.max_turns, 8);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        // Verify it can be deserialized back
        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.llm.provider, deserialized.llm.provider);
        assert_eq!(config.query.mode, deserialized.query.mode);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[query]\nmode = \"fast\"\n").unwrap();
        assert_eq!(config.query.mode, QueryMode::Fast);
        assert_eq!(config.query.max_pages, 6);
        assert_eq!(config.llm.vision_model, "google/gemini-2.5-flash");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DOCIA_PROVIDER", "OpenAI"),
            ("DOCIA_MAX_PAGES_PER_TASK", "3"),
            ("DOCIA_MAX_AGENT_ITERATIONS", "2"),
            ("DOCIA_MAX_CONVERSATION_TURNS", "4"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        config.validate_and_process().unwrap();

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.resolved_base_url(), "https://api.openai.com/v1");
        assert_eq!(config.llm.api_key_var(), "OPENAI_API_KEY");
        assert_eq!(config.query.max_pages, 3);
        assert_eq!(config.query.max_iterations, 2);
        assert_eq!(config.memory.max_turns, 4);
    }

    #[test]
    fn test_malformed_override_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides_from(|k| (k == "DOCIA_MAX_TASKS_PER_PLAN").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, DociaError::Config(_)));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.llm.provider = "mystery".to_string();
        assert!(config.validate_and_process().is_err());

        let mut config = Config::default();
        config.sufficiency.min_term_coverage = 1.5;
        assert!(config.validate_and_process().is_err());

        let mut config = Config::default();
        config.executor.base_delay_ms = 10_000;
        assert!(config.validate_and_process().is_err());
    }

    #[test]
    fn test_query_context_from_config() {
        let mut config = Config::default();
        config.query.max_pages = 2;
        config.query.mode = QueryMode::Fast;

        let ctx = config.query_context("What is the revenue?");
        assert_eq!(ctx.max_pages, 2);
        assert_eq!(ctx.mode, QueryMode::Fast);
        assert_eq!(ctx.query, "What is the revenue?");
    }
}
