//! Contracts for the external search and page-retrieval collaborators.
//!
//! Concrete HTTP-backed implementations live in `deepresearch-tools`; the
//! static implementations here serve tests and offline runs.

use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

impl SearchHit {
    pub fn new(url: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
        }
    }
}

/// Ordered search results plus the usage the provider charged. Empty is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub usage: u64,
}

/// Extracted text of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    pub url: String,
    pub title: String,
    pub text: String,
    pub usage: u64,
}

impl PageContent {
    /// Page content with usage estimated from its length.
    pub fn new(url: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let usage = estimate_units(&text);
        Self {
            url: url.into(),
            title: title.into(),
            text,
            usage,
        }
    }
}

/// Token-equivalent usage for providers that report none (about four characters per unit).
pub fn estimate_units(text: &str) -> u64 {
    (text.len() / 4) as u64
}

/// Web search collaborator.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<SearchResults, CollaboratorError>;
}

/// Page retrieval collaborator.
#[async_trait]
pub trait PageReader: Send + Sync {
    fn name(&self) -> &str;

    async fn read(&self, url: &str) -> Result<PageContent, CollaboratorError>;
}

/// Search provider answering from a fixed table keyed by exact query.
///
/// Unknown queries get the default hits (empty unless set).
#[derive(Debug, Default)]
pub struct StaticSearchProvider {
    results: HashMap<String, Result<Vec<SearchHit>, CollaboratorError>>,
    default_hits: Vec<SearchHit>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.results.insert(query.to_string(), Ok(hits));
        self
    }

    pub fn with_failure(mut self, query: &str, error: CollaboratorError) -> Self {
        self.results.insert(query.to_string(), Err(error));
        self
    }

    pub fn with_default(mut self, hits: Vec<SearchHit>) -> Self {
        self.default_hits = hits;
        self
    }

    /// Queries received so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    fn name(&self) -> &str {
        "static-search"
    }

    async fn search(&self, query: &str) -> Result<SearchResults, CollaboratorError> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.to_string());
        let hits = match self.results.get(query) {
            Some(Ok(hits)) => hits.clone(),
            Some(Err(e)) => return Err(e.clone()),
            None => self.default_hits.clone(),
        };
        let usage = hits
            .iter()
            .map(|h| estimate_units(&h.snippet) + estimate_units(&h.title))
            .sum();
        Ok(SearchResults { hits, usage })
    }
}

/// Page reader serving fixed pages keyed by URL.
///
/// Unknown URLs fail with `Unavailable`.
#[derive(Debug, Default)]
pub struct StaticPageReader {
    pages: HashMap<String, Result<PageContent, CollaboratorError>>,
    reads: Mutex<Vec<String>>,
}

impl StaticPageReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, title: &str, text: &str) -> Self {
        self.pages
            .insert(url.to_string(), Ok(PageContent::new(url, title, text)));
        self
    }

    pub fn with_failure(mut self, url: &str, error: CollaboratorError) -> Self {
        self.pages.insert(url.to_string(), Err(error));
        self
    }

    /// URLs read so far, in completion order.
    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl PageReader for StaticPageReader {
    fn name(&self) -> &str {
        "static-reader"
    }

    async fn read(&self, url: &str) -> Result<PageContent, CollaboratorError> {
        self.reads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        match self.pages.get(url) {
            Some(page) => page.clone(),
            None => Err(CollaboratorError::Unavailable {
                collaborator: "static-reader".into(),
                message: format!("no page for {url}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_search_lookup_and_default() {
        let provider = StaticSearchProvider::new()
            .with_results(
                "rust",
                vec![SearchHit::new("https://rust-lang.org/", "Rust", "A language")],
            )
            .with_default(vec![]);
        let hits = provider.search("rust").await.unwrap();
        assert_eq!(hits.hits.len(), 1);
        assert!(provider.search("go").await.unwrap().hits.is_empty());
        assert_eq!(provider.queries(), vec!["rust", "go"]);
    }

    #[tokio::test]
    async fn test_static_search_failure() {
        let provider = StaticSearchProvider::new().with_failure(
            "down",
            CollaboratorError::Unavailable {
                collaborator: "static-search".into(),
                message: "offline".into(),
            },
        );
        assert!(provider.search("down").await.is_err());
    }

    #[tokio::test]
    async fn test_static_reader() {
        let reader = StaticPageReader::new().with_page("https://a.example/", "A", "hello world");
        let page = reader.read("https://a.example/").await.unwrap();
        assert_eq!(page.title, "A");
        assert_eq!(page.usage, 2);
        assert!(reader.read("https://missing.example/").await.is_err());
        assert_eq!(reader.reads().len(), 2);
    }
}
