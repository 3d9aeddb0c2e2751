//! The single owned state of one research run.
//!
//! Durable stores (knowledge, frontier, gaps, budget, bad attempts, lessons)
//! survive a rejected answer. The diary is per-question and is cleared for the
//! query when its answer is rejected.

use super::availability::ActionAvailability;
use super::budget::BudgetTracker;
use super::frontier::UrlFrontier;
use super::gaps::{GapQueue, normalize_question};
use super::knowledge::KnowledgeStore;
use crate::types::ActionKind;
use serde::{Deserialize, Serialize};

/// One line of the step-by-step rationale log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub step: u64,
    pub question: String,
    pub action: Option<ActionKind>,
    pub think: String,
    pub summary: String,
}

/// What the error analyzer learned from a rejected answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub answer: String,
    pub rejection: String,
    pub recap: String,
    pub blame: String,
    pub improvement: String,
}

#[derive(Debug, Clone)]
pub struct ControllerState {
    query: String,
    pub knowledge: KnowledgeStore,
    pub frontier: UrlFrontier,
    pub gaps: GapQueue,
    pub budget: BudgetTracker,
    pub availability: ActionAvailability,
    pub bad_attempts: u32,
    pub diary: Vec<DiaryEntry>,
    pub lessons: Vec<Lesson>,
    /// Every search query sent so far, including rewritten ones.
    pub searched_queries: Vec<String>,
    /// Actions the previous step's outcome asked to switch off.
    pub pending_disable: Vec<ActionKind>,
}

impl ControllerState {
    pub fn new(query: &str, budget_ceiling: u64) -> Self {
        Self {
            query: query.to_string(),
            knowledge: KnowledgeStore::new(),
            frontier: UrlFrontier::new(),
            gaps: GapQueue::new(query),
            budget: BudgetTracker::new(budget_ceiling),
            availability: ActionAvailability::all_enabled(),
            bad_attempts: 0,
            diary: Vec::new(),
            lessons: Vec::new(),
            searched_queries: Vec::new(),
            pending_disable: Vec::new(),
        }
    }

    /// The original query. Never changes.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Build this step's mask from the previous outcome and forget the request.
    pub fn refresh_availability(&mut self) -> ActionAvailability {
        self.availability = ActionAvailability::for_step(&self.pending_disable);
        self.pending_disable.clear();
        self.availability
    }

    /// Ask for `kind` to be unavailable on the next step.
    pub fn disable_next(&mut self, kind: ActionKind) {
        if kind != ActionKind::Answer && !self.pending_disable.contains(&kind) {
            self.pending_disable.push(kind);
        }
    }

    pub fn has_searched(&self, query: &str) -> bool {
        let needle = normalize_question(query);
        self.searched_queries
            .iter()
            .any(|q| normalize_question(q) == needle)
    }

    /// Diary entries for one question, oldest first.
    pub fn diary_for(&self, question: &str) -> Vec<&DiaryEntry> {
        let needle = normalize_question(question);
        self.diary
            .iter()
            .filter(|e| normalize_question(&e.question) == needle)
            .collect()
    }

    /// Drop the per-question rationale for `question`; every durable store is kept.
    pub fn reset_question_context(&mut self, question: &str) {
        let needle = normalize_question(question);
        self.diary
            .retain(|e| normalize_question(&e.question) != needle);
    }
}
