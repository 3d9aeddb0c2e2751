//! Jina search (`api.jina.ai/v1/search`) and reader (`r.jina.ai`) collaborators.

use crate::http::{self, invalid_response};
use async_trait::async_trait;
use deepresearch_core::error::{CollaboratorError, ConfigError};
use deepresearch_core::research::collaborators::estimate_units;
use deepresearch_core::research::{PageContent, PageReader, SearchHit, SearchProvider, SearchResults};
use serde::Deserialize;
use tracing::info;

const SEARCH_URL: &str = "https://api.jina.ai/v1/search";
const READER_URL: &str = "https://r.jina.ai/";

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    tokens: u64,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(default)]
    data: Option<Vec<SearchItem>>,
}

#[derive(Debug, Deserialize)]
struct ReadData {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ReadBody {
    #[serde(default)]
    data: Option<ReadData>,
}

/// Turn a Jina search body into results, keeping at most `max_results` hits.
///
/// Usage is the sum of per-result tokens; results without a URL are skipped.
pub fn parse_search_body(
    body: serde_json::Value,
    max_results: usize,
) -> Result<SearchResults, CollaboratorError> {
    let parsed: SearchBody = serde_json::from_value(body)
        .map_err(|e| invalid_response("jina-search", e.to_string()))?;
    let items = parsed
        .data
        .ok_or_else(|| invalid_response("jina-search", "response has no data"))?;

    let usage = items
        .iter()
        .map(|item| item.usage.as_ref().map_or(0, |u| u.tokens))
        .sum();
    let hits = items
        .into_iter()
        .filter(|item| !item.url.trim().is_empty())
        .take(max_results)
        .map(|item| {
            let snippet = if item.description.trim().is_empty() {
                item.content
            } else {
                item.description
            };
            SearchHit::new(item.url, item.title, snippet)
        })
        .collect();
    Ok(SearchResults { hits, usage })
}

/// Turn a Jina reader body into page content.
///
/// Falls back to the requested URL and a length estimate when the service
/// omits them.
pub fn parse_read_body(
    requested_url: &str,
    body: serde_json::Value,
    max_chars: usize,
) -> Result<PageContent, CollaboratorError> {
    let parsed: ReadBody = serde_json::from_value(body)
        .map_err(|e| invalid_response("jina-reader", e.to_string()))?;
    let data = parsed
        .data
        .ok_or_else(|| invalid_response("jina-reader", "response has no data"))?;

    let text = truncate(&data.content, max_chars);
    let usage = data
        .usage
        .map(|u| u.tokens)
        .filter(|t| *t > 0)
        .unwrap_or_else(|| estimate_units(&data.content));
    let url = if data.url.trim().is_empty() {
        requested_url.to_string()
    } else {
        data.url
    };
    Ok(PageContent {
        url,
        title: data.title,
        text,
        usage,
    })
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Web search through Jina's search API.
pub struct JinaSearch {
    client: reqwest::Client,
    api_key: String,
    max_results: usize,
    timeout_secs: u64,
}

impl JinaSearch {
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
impl SearchProvider for JinaSearch {
    fn name(&self) -> &str {
        "jina-search"
    }

    async fn search(&self, query: &str) -> Result<SearchResults, CollaboratorError> {
        let request = self
            .client
            .post(SEARCH_URL)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&serde_json::json!({ "query": query }));
        let body = http::send_json(self.name(), self.timeout_secs, request).await?;
        let results = parse_search_body(body, self.max_results)?;
        info!(query, results = results.hits.len(), tokens = results.usage, "Jina search");
        Ok(results)
    }
}

/// Page retrieval through Jina's reader, returning markdown.
pub struct JinaReader {
    client: reqwest::Client,
    api_key: String,
    max_chars: usize,
    timeout_secs: u64,
}

impl JinaReader {
    pub fn new(api_key: String, max_chars: usize, timeout_secs: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http::client(timeout_secs)?,
            api_key,
            max_chars,
            timeout_secs,
        })
    }

    pub fn from_env(var: &str, max_chars: usize, timeout_secs: u64) -> Result<Self, ConfigError> {
        Self::new(http::api_key(var)?, max_chars, timeout_secs)
    }
}

#[async_trait]
impl PageReader for JinaReader {
    fn name(&self) -> &str {
        "jina-reader"
    }

    async fn read(&self, url: &str) -> Result<PageContent, CollaboratorError> {
        let request = self
            .client
            .post(READER_URL)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .header("X-Retain-Images", "none")
            .header("X-Return-Format", "markdown")
            .json(&serde_json::json!({ "url": url }));
        let body = http::send_json(self.name(), self.timeout_secs, request).await?;
        let page = parse_read_body(url, body, self.max_chars)?;
        info!(url, title = %page.title, tokens = page.usage, "Jina read");
        Ok(page)
    }
}
