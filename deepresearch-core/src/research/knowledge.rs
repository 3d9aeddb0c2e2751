//! Append-only knowledge accumulated during a run.

use super::gaps::normalize_question;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A piece of evidence: where a claim came from and the quoted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub url: String,
    pub snippet: String,
}

impl Reference {
    pub fn new(url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// Which action produced a knowledge item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginAction {
    Search,
    Visit,
    ReflectResolved,
    BeastMode,
}

/// A (question, answer, references) triple. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub question: String,
    pub answer: String,
    pub references: Vec<Reference>,
    pub origin: OriginAction,
    /// Step that produced the item.
    pub step: u64,
}

impl KnowledgeItem {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        references: Vec<Reference>,
        origin: OriginAction,
        step: u64,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            references,
            origin,
            step,
        }
    }
}

/// Append-only collection of knowledge items.
///
/// Only shared references to stored items are handed out; corrections are
/// new items.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeStore {
    items: Vec<KnowledgeItem>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: KnowledgeItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[KnowledgeItem] {
        &self.items
    }

    /// The most recent `n` items, oldest first.
    pub fn recent(&self, n: usize) -> &[KnowledgeItem] {
        let start = self.items.len().saturating_sub(n);
        &self.items[start..]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a question has already been answered by a reflect-resolved item.
    pub fn has_answered(&self, question: &str) -> bool {
        let needle = normalize_question(question);
        self.items.iter().any(|item| {
            item.origin == OriginAction::ReflectResolved
                && normalize_question(&item.question) == needle
        })
    }

    /// Questions answered so far, in insertion order.
    pub fn answered_questions(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.origin == OriginAction::ReflectResolved)
            .map(|item| item.question.clone())
            .collect()
    }

    /// All references across the store, first occurrence per URL, in insertion order.
    pub fn references(&self) -> Vec<Reference> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .flat_map(|item| item.references.iter())
            .filter(|r| seen.insert(r.url.clone()))
            .cloned()
            .collect()
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.items
            .iter()
            .any(|item| item.references.iter().any(|r| r.url == url))
    }
}
