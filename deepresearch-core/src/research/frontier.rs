//! URL frontier: discovered vs. visited URLs.
//!
//! Entries are keyed by normalized URL, so rediscovering a URL (with or
//! without a fragment, with a differently-cased host) is a no-op. An entry
//! flips from unvisited to visited exactly once.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// A URL the run knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub url: String,
    pub visited: bool,
    pub discovered_at_step: u64,
    pub title: String,
    pub snippet: String,
}

/// Canonical form of a URL used as the frontier key.
///
/// Only http(s) URLs are accepted. Fragments are dropped; scheme and host are
/// lowercased by the parser.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct UrlFrontier {
    entries: Vec<FrontierEntry>,
    index: HashMap<String, usize>,
}

impl UrlFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovered URL. Returns `true` if it was new.
    pub fn discover(
        &mut self,
        url: &str,
        title: impl Into<String>,
        snippet: impl Into<String>,
        step: u64,
    ) -> bool {
        let Some(key) = normalize_url(url) else {
            return false;
        };
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(FrontierEntry {
            url: key,
            visited: false,
            discovered_at_step: step,
            title: title.into(),
            snippet: snippet.into(),
        });
        true
    }

    /// Mark a URL visited. Returns `true` only on the unvisited → visited transition.
    ///
    /// A URL that was never discovered is inserted as already visited.
    pub fn mark_visited(&mut self, url: &str, step: u64) -> bool {
        let Some(key) = normalize_url(url) else {
            return false;
        };
        match self.index.get(&key) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                if entry.visited {
                    false
                } else {
                    entry.visited = true;
                    true
                }
            }
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push(FrontierEntry {
                    url: key,
                    visited: true,
                    discovered_at_step: step,
                    title: String::new(),
                    snippet: String::new(),
                });
                true
            }
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        normalize_url(url).is_some_and(|key| self.index.contains_key(&key))
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.get(url).is_some_and(|e| e.visited)
    }

    pub fn get(&self, url: &str) -> Option<&FrontierEntry> {
        let key = normalize_url(url)?;
        self.index.get(&key).map(|&i| &self.entries[i])
    }

    /// Unvisited entries in discovery order.
    pub fn unvisited(&self) -> impl Iterator<Item = &FrontierEntry> {
        self.entries.iter().filter(|e| !e.visited)
    }

    pub fn entries(&self) -> &[FrontierEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn visited_count(&self) -> usize {
        self.entries.iter().filter(|e| e.visited).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/a#section").as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(
            normalize_url("https://example.com").as_deref(),
            Some("https://example.com/")
        );
        assert_eq!(normalize_url("ftp://example.com/file"), None);
        assert_eq!(normalize_url("not a url"), None);
        assert_eq!(normalize_url("mailto:someone@example.com"), None);
    }

    #[test]
    fn test_discover_dedup() {
        let mut frontier = UrlFrontier::new();
        assert!(frontier.discover("https://a.example/x", "A", "snippet", 1));
        assert!(!frontier.discover("https://A.example/x#frag", "A again", "", 2));
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier.get("https://a.example/x").unwrap().title, "A");
        assert_eq!(frontier.unvisited().count(), 1);
    }

    #[test]
    fn test_mark_visited_once() {
        let mut frontier = UrlFrontier::new();
        frontier.discover("https://a.example/", "", "", 1);
        assert!(frontier.mark_visited("https://a.example/", 2));
        assert!(!frontier.mark_visited("https://a.example/", 3));
        assert!(frontier.is_visited("https://a.example"));
        assert_eq!(frontier.unvisited().count(), 0);
    }

    #[test]
    fn test_rediscover_visited_is_noop() {
        let mut frontier = UrlFrontier::new();
        frontier.discover("https://a.example/", "", "", 1);
        frontier.mark_visited("https://a.example/", 2);
        assert!(!frontier.discover("https://a.example/", "", "", 3));
        assert!(frontier.is_visited("https://a.example/"));
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_visit_undiscovered_inserts_visited() {
        let mut frontier = UrlFrontier::new();
        assert!(frontier.mark_visited("https://b.example/page", 4));
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier.visited_count(), 1);
        assert!(!frontier.discover("https://b.example/page", "", "", 5));
    }

    #[test]
    fn test_invalid_urls_ignored() {
        let mut frontier = UrlFrontier::new();
        assert!(!frontier.discover("javascript:alert(1)", "", "", 1));
        assert!(!frontier.mark_visited("", 1));
        assert!(frontier.is_empty());
    }
}
