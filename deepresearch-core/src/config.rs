//! Configuration system for DeepResearch.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/deepresearch/config.toml` and/or
//! `.deepresearch/config.toml` in the workspace directory.

use crate::error::ConfigError;
use crate::gateway::GatewayConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for a research deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl ResearchConfig {
    /// Reject values the controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.budget == 0 {
            return Err(ConfigError::Invalid {
                message: "controller.budget must be at least 1".into(),
            });
        }
        if self.controller.max_bad_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "controller.max_bad_attempts must be at least 1".into(),
            });
        }
        if self.controller.visit_concurrency == 0 {
            return Err(ConfigError::Invalid {
                message: "controller.visit_concurrency must be at least 1".into(),
            });
        }
        if self.controller.max_urls_per_visit == 0 {
            return Err(ConfigError::Invalid {
                message: "controller.max_urls_per_visit must be at least 1".into(),
            });
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "llm.model must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Language model provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai", "openai-compatible", "ollama".
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o-mini").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: Option<usize>,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Sampling temperature per model role.
    pub temperatures: RoleTemperatures,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            max_tokens: Some(4096),
            timeout_secs: 120,
            temperatures: RoleTemperatures::default(),
        }
    }
}

/// Sampling temperature for each model role.
///
/// Classification-style calls (evaluation, dedup, error analysis) run cold;
/// generative calls run warmer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleTemperatures {
    pub decision: f32,
    pub evaluator: f32,
    pub query_rewriter: f32,
    pub dedup: f32,
    pub error_analyzer: f32,
    pub beast_mode: f32,
}

impl Default for RoleTemperatures {
    fn default() -> Self {
        Self {
            decision: 0.7,
            evaluator: 0.1,
            query_rewriter: 0.7,
            dedup: 0.1,
            error_analyzer: 0.1,
            beast_mode: 0.7,
        }
    }
}

/// Which web search backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    Jina,
    Brave,
    #[serde(alias = "ddg")]
    DuckDuckGo,
}

impl SearchProviderKind {
    /// Environment variable holding the API key when none is configured.
    pub fn default_key_env(&self) -> Option<&'static str> {
        match self {
            SearchProviderKind::Jina => Some("JINA_API_KEY"),
            SearchProviderKind::Brave => Some("BRAVE_API_KEY"),
            SearchProviderKind::DuckDuckGo => None,
        }
    }
}

/// Search collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub provider: SearchProviderKind,
    /// Overrides the provider's default API key variable.
    pub api_key_env: Option<String>,
    /// Maximum hits kept per query.
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProviderKind::Jina,
            api_key_env: None,
            max_results: 10,
            timeout_secs: 30,
        }
    }
}

impl SearchConfig {
    pub fn key_env(&self) -> Option<String> {
        self.api_key_env
            .clone()
            .or_else(|| self.provider.default_key_env().map(str::to_string))
    }
}

/// Which page retrieval backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderKind {
    /// Jina reader service (`r.jina.ai`), returns markdown.
    Jina,
    /// Plain HTTP GET with local HTML-to-text extraction.
    Direct,
}

/// Page retrieval collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub provider: ReaderKind,
    pub api_key_env: String,
    /// Extracted text longer than this is truncated.
    pub max_chars: usize,
    pub timeout_secs: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            provider: ReaderKind::Jina,
            api_key_env: "JINA_API_KEY".to_string(),
            max_chars: 12_000,
            timeout_secs: 30,
        }
    }
}

/// Controller loop limits and feature switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Default budget ceiling in consumed units when the caller supplies none.
    pub budget: u64,
    /// Default number of rejected answers before redirecting to beast mode.
    pub max_bad_attempts: u32,
    /// How many recent knowledge items the decision context includes.
    pub knowledge_window: usize,
    /// How many unvisited URLs the decision context includes.
    pub frontier_window: usize,
    /// How many diary entries the decision context includes.
    pub diary_window: usize,
    /// Upper bound on URLs read by one visit action.
    pub max_urls_per_visit: usize,
    /// Concurrent page reads within one visit action.
    pub visit_concurrency: usize,
    /// Upper bound on sub-questions accepted from one reflect action.
    pub max_sub_questions: usize,
    /// Extracted text shorter than this does not count as new content.
    pub min_content_chars: usize,
    /// Length of the reference snippet kept per page.
    pub snippet_chars: usize,
    /// Expand search queries into keyword queries before searching.
    pub rewrite_queries: bool,
    /// Drop semantically duplicate sub-questions with a model call.
    pub semantic_dedup: bool,
    /// Analyze the diary after a rejected answer and keep the lesson.
    pub analyze_errors: bool,
    /// Pause between steps.
    pub step_delay_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            budget: 1_000_000,
            max_bad_attempts: 3,
            knowledge_window: 20,
            frontier_window: 20,
            diary_window: 12,
            max_urls_per_visit: 3,
            visit_concurrency: 3,
            max_sub_questions: 3,
            min_content_chars: 120,
            snippet_chars: 500,
            rewrite_queries: true,
            semantic_dedup: true,
            analyze_errors: true,
            step_delay_ms: 0,
        }
    }
}

/// Retry policy for collaborator calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "deepresearch", "deepresearch")
}

/// Platform data directory used for task records and logs.
pub fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".deepresearch"))
}

/// Load configuration from all sources with proper layering.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `DEEPRESEARCH_`)
/// 3. Workspace-local config (`.deepresearch/config.toml`)
/// 4. User config (`~/.config/deepresearch/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ResearchConfig>,
) -> Result<ResearchConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ResearchConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".deepresearch").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // DEEPRESEARCH_LLM__MODEL, DEEPRESEARCH_CONTROLLER__BUDGET, ...
    figment = figment.merge(Env::prefixed("DEEPRESEARCH_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

/// Check whether a user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(dirs) = project_dirs()
        && dirs.config_dir().join("config.toml").exists()
    {
        return true;
    }
    workspace.is_some_and(|ws| ws.join(".deepresearch").join("config.toml").exists())
}
