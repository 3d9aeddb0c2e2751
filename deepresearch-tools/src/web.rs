//! Keyless web access: DuckDuckGo instant answers for search and a direct
//! HTTP fetch with local HTML-to-text extraction for reading.

use crate::http::{self, classify_status, classify_transport, invalid_response};
use crate::jina::truncate;
use async_trait::async_trait;
use deepresearch_core::error::{CollaboratorError, ConfigError};
use deepresearch_core::research::collaborators::estimate_units;
use deepresearch_core::research::{PageContent, PageReader, SearchHit, SearchProvider, SearchResults};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// DuckDuckGoSearch
// ---------------------------------------------------------------------------

/// Search through the DuckDuckGo instant answer API.
///
/// No API key required. Coverage is thin compared to a full search API:
/// abstracts and related topics only.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    max_results: usize,
    timeout_secs: u64,
}

impl DuckDuckGoSearch {
    pub fn new(max_results: usize, timeout_secs: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http::client(timeout_secs)?,
            max_results,
            timeout_secs,
        })
    }
}

fn topic_hit(topic: &serde_json::Value) -> Option<SearchHit> {
    let text = topic.get("Text")?.as_str()?;
    let url = topic.get("FirstURL")?.as_str()?;
    if url.is_empty() {
        return None;
    }
    let title = text.split(" - ").next().unwrap_or(text);
    Some(SearchHit::new(url, title, text))
}

/// Collect hits from an instant answer body: the abstract, direct results,
/// then related topics (including grouped ones).
pub fn parse_instant_answer(body: &serde_json::Value, max_results: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    if let Some(abstract_text) = body.get("AbstractText").and_then(|v| v.as_str())
        && !abstract_text.is_empty()
        && let Some(url) = body.get("AbstractURL").and_then(|v| v.as_str())
        && !url.is_empty()
    {
        let title = body
            .get("Heading")
            .and_then(|v| v.as_str())
            .filter(|h| !h.is_empty())
            .or_else(|| body.get("AbstractSource").and_then(|v| v.as_str()))
            .unwrap_or("Abstract");
        hits.push(SearchHit::new(url, title, abstract_text));
    }

    if let Some(results) = body.get("Results").and_then(|v| v.as_array()) {
        hits.extend(results.iter().filter_map(topic_hit));
    }

    if let Some(topics) = body.get("RelatedTopics").and_then(|v| v.as_array()) {
        for topic in topics {
            match topic.get("Topics").and_then(|v| v.as_array()) {
                Some(group) => hits.extend(group.iter().filter_map(topic_hit)),
                None => hits.extend(topic_hit(topic)),
            }
        }
    }

    hits.truncate(max_results);
    hits
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str) -> Result<SearchResults, CollaboratorError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
            urlencoding::encode(query)
        );
        let body = http::send_json(self.name(), self.timeout_secs, self.client.get(&url)).await?;
        let hits = parse_instant_answer(&body, self.max_results);
        let usage = hits
            .iter()
            .map(|h| estimate_units(&h.snippet) + estimate_units(&h.title))
            .sum();
        info!(query, results = hits.len(), "DuckDuckGo search");
        Ok(SearchResults { hits, usage })
    }
}

// ---------------------------------------------------------------------------
// HttpPageReader
// ---------------------------------------------------------------------------

/// Fetch a URL directly and extract readable text.
///
/// Much lighter than a rendering reader; pages that need JavaScript come
/// back mostly empty.
pub struct HttpPageReader {
    client: reqwest::Client,
    max_chars: usize,
    timeout_secs: u64,
}

impl HttpPageReader {
    pub fn new(max_chars: usize, timeout_secs: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http::client(timeout_secs)?,
            max_chars,
            timeout_secs,
        })
    }
}

#[async_trait]
impl PageReader for HttpPageReader {
    fn name(&self) -> &str {
        "http-reader"
    }

    async fn read(&self, url: &str) -> Result<PageContent, CollaboratorError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(CollaboratorError::InvalidUrl {
                url: url.to_string(),
                reason: "URL must start with http:// or https://".into(),
            });
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport(self.name(), self.timeout_secs, e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(self.name(), self.timeout_secs, e))?;
        if !status.is_success() {
            return Err(classify_status(self.name(), status.as_u16(), &body));
        }

        let is_html =
            content_type.contains("text/html") || content_type.contains("application/xhtml");
        let (title, text) = if is_html {
            (extract_title(&body).unwrap_or_default(), extract_text_from_html(&body))
        } else if content_type.is_empty() || content_type.starts_with("text/") || content_type.contains("json") {
            (String::new(), body)
        } else {
            return Err(invalid_response(
                self.name(),
                format!("unsupported content type '{content_type}'"),
            ));
        };

        let usage = estimate_units(&text);
        debug!(url, final_url = %final_url, chars = text.len(), "Fetched page");
        Ok(PageContent {
            url: final_url,
            title,
            text: truncate(&text, self.max_chars),
            usage,
        })
    }
}

/// Contents of the first `<title>` element, whitespace-collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = decode_entities(html.get(start..end)?)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Simple HTML-to-text extraction.
///
/// Strips tags and skips script, style, and head content. Block elements
/// become line breaks; blank lines are dropped.
pub fn extract_text_from_html(html: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    let mut skip_depth = 0usize;
    let mut tag_name = String::new();
    let mut building_tag = false;

    for ch in html.chars() {
        if ch == '<' {
            in_tag = true;
            building_tag = true;
            tag_name.clear();
            continue;
        }
        if ch == '>' && in_tag {
            in_tag = false;
            building_tag = false;

            let tag = tag_name.to_lowercase();
            match tag.as_str() {
                "script" | "style" | "head" | "noscript" => skip_depth += 1,
                "/script" | "/style" | "/head" | "/noscript" => {
                    skip_depth = skip_depth.saturating_sub(1)
                }
                _ => {}
            }

            let name = tag.trim_start_matches('/').trim_end_matches('/');
            let is_block = matches!(
                name,
                "p" | "br" | "div" | "li" | "tr" | "section" | "article" | "pre" | "blockquote"
                    | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
            );
            if is_block {
                text.push('\n');
            }
            continue;
        }
        if in_tag {
            if building_tag && (ch.is_alphanumeric() || ch == '/') {
                tag_name.push(ch);
            } else {
                building_tag = false;
            }
            continue;
        }
        if skip_depth > 0 {
            continue;
        }
        text.push(ch);
    }

    let text = decode_entities(&text);
    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
