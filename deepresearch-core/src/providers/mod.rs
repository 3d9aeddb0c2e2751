//! LLM provider implementations.
//!
//! Use `create_provider()` to instantiate the provider named in the config.

pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::{ConfigError, Result};
use std::sync::Arc;

pub use openai_compat::OpenAiCompatibleProvider;

/// Create an LLM provider based on the configuration.
///
/// Every supported backend speaks the chat completions protocol; the
/// provider name only selects defaults such as the local Ollama endpoint.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    match config.provider.as_str() {
        "openai" | "openai-compatible" | "deepseek" | "together" | "vllm" => {
            Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
        }
        "ollama" => {
            let mut config = config.clone();
            if config.base_url.is_none() {
                config.base_url = Some("http://localhost:11434/v1".to_string());
            }
            Ok(Arc::new(OpenAiCompatibleProvider::new(&config)?))
        }
        other => Err(ConfigError::UnknownProvider {
            kind: "LLM".into(),
            name: other.to_string(),
        }
        .into()),
    }
}
