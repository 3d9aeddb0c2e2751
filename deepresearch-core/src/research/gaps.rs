//! Gap queue: open questions waiting to be resolved.
//!
//! FIFO, so sub-questions added by reflection are explored breadth-first.
//! Entries are unique under case/whitespace normalization.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Lowercase and collapse whitespace. Used for all question equality checks.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// An open question, tagged with whether it is the original query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum GapEntry {
    Original(String),
    SubQuestion(String),
}

impl GapEntry {
    pub fn text(&self) -> &str {
        match self {
            GapEntry::Original(text) | GapEntry::SubQuestion(text) => text,
        }
    }

    pub fn is_original(&self) -> bool {
        matches!(self, GapEntry::Original(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GapQueue {
    entries: VecDeque<GapEntry>,
}

impl GapQueue {
    /// A queue holding only the original query.
    pub fn new(query: &str) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(GapEntry::Original(query.to_string()));
        Self { entries }
    }

    /// Enqueue at the tail. Returns `false` if an equal question is already queued.
    pub fn push_back(&mut self, entry: GapEntry) -> bool {
        if self.contains(entry.text()) {
            return false;
        }
        self.entries.push_back(entry);
        true
    }

    /// Enqueue at the head, so the same question is retried next.
    pub fn push_front(&mut self, entry: GapEntry) -> bool {
        if self.contains(entry.text()) {
            return false;
        }
        self.entries.push_front(entry);
        true
    }

    pub fn pop_front(&mut self) -> Option<GapEntry> {
        self.entries.pop_front()
    }

    pub fn contains(&self, question: &str) -> bool {
        let needle = normalize_question(question);
        self.entries
            .iter()
            .any(|e| normalize_question(e.text()) == needle)
    }

    pub fn contains_original(&self) -> bool {
        self.entries.iter().any(GapEntry::is_original)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GapEntry> {
        self.entries.iter()
    }

    /// Question texts in queue order.
    pub fn questions(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.text().to_string()).collect()
    }
}
