//! # DeepResearch Tools
//!
//! HTTP-backed implementations of the search and page-retrieval
//! collaborators used by the research controller.
//!
//! Use [`build_search_provider`] and [`build_page_reader`] to instantiate the
//! backends named in the configuration.

pub mod brave;
mod http;
pub mod jina;
pub mod web;

pub use brave::BraveSearch;
pub use jina::{JinaReader, JinaSearch};
pub use web::{DuckDuckGoSearch, HttpPageReader};

use deepresearch_core::config::{ReaderConfig, ReaderKind, SearchConfig, SearchProviderKind};
use deepresearch_core::error::ConfigError;
use deepresearch_core::research::{PageReader, SearchProvider};
use std::sync::Arc;

/// Create the search provider named in the configuration.
///
/// Fails when the provider needs an API key and its variable is unset.
pub fn build_search_provider(config: &SearchConfig) -> Result<Arc<dyn SearchProvider>, ConfigError> {
    let key_var = config.key_env();
    let provider: Arc<dyn SearchProvider> = match config.provider {
        SearchProviderKind::Jina => Arc::new(JinaSearch::from_env(
            key_var.as_deref().unwrap_or("JINA_API_KEY"),
            config.max_results,
            config.timeout_secs,
        )?),
        SearchProviderKind::Brave => Arc::new(BraveSearch::from_env(
            key_var.as_deref().unwrap_or("BRAVE_API_KEY"),
            config.max_results,
            config.timeout_secs,
        )?),
        SearchProviderKind::DuckDuckGo => Arc::new(DuckDuckGoSearch::new(
            config.max_results,
            config.timeout_secs,
        )?),
    };
    tracing::debug!(provider = provider.name(), "Search provider ready");
    Ok(provider)
}

/// Create the page reader named in the configuration.
pub fn build_page_reader(config: &ReaderConfig) -> Result<Arc<dyn PageReader>, ConfigError> {
    let reader: Arc<dyn PageReader> = match config.provider {
        ReaderKind::Jina => Arc::new(JinaReader::from_env(
            &config.api_key_env,
            config.max_chars,
            config.timeout_secs,
        )?),
        ReaderKind::Direct => Arc::new(HttpPageReader::new(config.max_chars, config.timeout_secs)?),
    };
    tracing::debug!(reader = reader.name(), "Page reader ready");
    Ok(reader)
}
