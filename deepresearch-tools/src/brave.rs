//! Brave web search collaborator.

use crate::http::{self, invalid_response};
use async_trait::async_trait;
use deepresearch_core::error::{CollaboratorError, ConfigError};
use deepresearch_core::research::collaborators::estimate_units;
use deepresearch_core::research::{SearchHit, SearchProvider, SearchResults};
use tracing::info;

const SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Extract hits from a Brave response. Brave reports no usage, so it is
/// estimated from the size of the body.
pub fn parse_brave_body(
    body: &serde_json::Value,
    max_results: usize,
) -> Result<SearchResults, CollaboratorError> {
    if !body.is_object() {
        return Err(invalid_response("brave-search", "response is not an object"));
    }
    let hits = body
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|results| {
            results
                .iter()
                .filter_map(|r| {
                    let url = r.get("url")?.as_str()?;
                    let title = r.get("title").and_then(|v| v.as_str()).unwrap_or("");
                    let snippet = r.get("description").and_then(|v| v.as_str()).unwrap_or("");
                    Some(SearchHit::new(url, title, snippet))
                })
                .take(max_results)
                .collect()
        })
        .unwrap_or_default();
    Ok(SearchResults {
        hits,
        usage: estimate_units(&body.to_string()),
    })
}

pub struct BraveSearch {
    client: reqwest::Client,
    api_key: String,
    max_results: usize,
    timeout_secs: u64,
}

impl BraveSearch {
    pub fn new(api_key: String, max_results: usize, timeout_secs: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http::client(timeout_secs)?,
            api_key,
            max_results,
            timeout_secs,
        })
    }

    pub fn from_env(var: &str, max_results: usize, timeout_secs: u64) -> Result<Self, ConfigError> {
        Self::new(http::api_key(var)?, max_results, timeout_secs)
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    fn name(&self) -> &str {
        "brave-search"
    }

    async fn search(&self, query: &str) -> Result<SearchResults, CollaboratorError> {
        let request = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query)])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key);
        let body = http::send_json(self.name(), self.timeout_secs, request).await?;
        let results = parse_brave_body(&body, self.max_results)?;
        info!(query, results = results.hits.len(), "Brave search");
        Ok(results)
    }
}
