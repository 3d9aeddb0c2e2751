//! Action dispatch: runs a validated decision against the collaborators.
//!
//! `dispatch` only reads the state and returns a [`StepOutcome`]; the
//! controller commits it with [`apply_outcome`] once the step has finished.
//! A step cancelled mid-flight therefore leaves no partial writes.

use super::budget::CostCategory;
use super::collaborators::{PageContent, PageReader, SearchHit, SearchProvider};
use super::decision::{Decision, ProposedAction};
use super::dedup::SemanticDeduplicator;
use super::frontier::normalize_url;
use super::gaps::{GapEntry, normalize_question};
use super::knowledge::{KnowledgeItem, OriginAction, Reference};
use super::prompt::truncate_chars;
use super::query_rewriter::QueryRewriter;
use super::state::ControllerState;
use crate::config::{ControllerConfig, RetryConfig};
use crate::retry::with_retry;
use crate::types::{ActionKind, TokenUsage};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Characters of page text kept in a visit knowledge item.
const PAGE_EXCERPT_CHARS: usize = 4000;

/// Dispatcher knobs, taken from the controller configuration.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub rewrite_queries: bool,
    pub semantic_dedup: bool,
    pub max_sub_questions: usize,
    pub min_content_chars: usize,
    pub snippet_chars: usize,
    pub visit_concurrency: usize,
}

impl From<&ControllerConfig> for DispatchSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            rewrite_queries: config.rewrite_queries,
            semantic_dedup: config.semantic_dedup,
            max_sub_questions: config.max_sub_questions.max(1),
            min_content_chars: config.min_content_chars,
            snippet_chars: config.snippet_chars.max(1),
            visit_concurrency: config.visit_concurrency.max(1),
        }
    }
}

/// A candidate answer to the original query, awaiting evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateAnswer {
    pub text: String,
    pub references: Vec<Reference>,
}

/// Everything one action produced. Applied to the state as a unit.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub knowledge: Vec<KnowledgeItem>,
    pub discovered: Vec<SearchHit>,
    pub visited: Vec<String>,
    pub new_gaps: Vec<String>,
    pub searched: Vec<String>,
    pub charges: Vec<(CostCategory, u64)>,
    /// Action to switch off for the next step.
    pub disable: Option<ActionKind>,
    /// The question this step worked on is answered.
    pub resolved: bool,
    pub candidate: Option<CandidateAnswer>,
    pub summary: String,
    pub errors: Vec<String>,
}

impl StepOutcome {
    fn charge(&mut self, category: CostCategory, units: u64) {
        if units > 0 {
            self.charges.push((category, units));
        }
    }

    fn charge_usage(&mut self, category: CostCategory, usage: TokenUsage) {
        self.charge(category, usage.total() as u64);
    }

    /// All references carried by the knowledge this step produced.
    pub fn references(&self) -> Vec<Reference> {
        self.knowledge
            .iter()
            .flat_map(|item| item.references.iter().cloned())
            .collect()
    }
}

pub struct Dispatcher {
    search: Arc<dyn SearchProvider>,
    reader: Arc<dyn PageReader>,
    rewriter: QueryRewriter,
    dedup: SemanticDeduplicator,
    retry: RetryConfig,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        reader: Arc<dyn PageReader>,
        rewriter: QueryRewriter,
        dedup: SemanticDeduplicator,
        retry: RetryConfig,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            search,
            reader,
            rewriter,
            dedup,
            retry,
            settings,
        }
    }

    pub async fn dispatch(
        &self,
        proposed: &ProposedAction,
        question: &GapEntry,
        state: &ControllerState,
        step: u64,
    ) -> StepOutcome {
        match &proposed.decision {
            Decision::Search { query } => self.search(query, &proposed.think, state, step).await,
            Decision::Visit { urls } => self.visit(urls, question, state, step).await,
            Decision::Reflect { sub_questions } => {
                self.reflect(sub_questions, question, state).await
            }
            Decision::Answer { text, references } => answer(text, references, question, step),
        }
    }

    async fn search(
        &self,
        query: &str,
        think: &str,
        state: &ControllerState,
        step: u64,
    ) -> StepOutcome {
        let mut out = StepOutcome::default();

        let mut queries = vec![query.to_string()];
        if self.settings.rewrite_queries {
            match self.rewriter.rewrite(query, think).await {
                Ok((rewritten, usage)) => {
                    out.charge_usage(CostCategory::QueryRewriter, usage);
                    queries = rewritten;
                }
                Err(e) => {
                    warn!(query, error = %e, "Query rewrite failed; searching the raw query");
                    out.errors.push(format!("query rewrite failed: {e}"));
                }
            }
        }

        let mut fresh: Vec<String> = Vec::new();
        for q in queries {
            let key = normalize_question(&q);
            if !state.has_searched(&q) && !fresh.iter().any(|f| normalize_question(f) == key) {
                fresh.push(q);
            }
        }
        if fresh.is_empty() {
            out.disable = Some(ActionKind::Search);
            out.summary = "every query was already searched".into();
            return out;
        }

        let mut hits: Vec<SearchHit> = Vec::new();
        let mut seen = HashSet::new();
        let mut failures = 0;
        for q in &fresh {
            out.searched.push(q.clone());
            match with_retry(&self.retry, || self.search.search(q)).await {
                Ok(results) => {
                    out.charge(CostCategory::Search, results.usage);
                    for hit in results.hits {
                        let Some(url) = normalize_url(&hit.url) else {
                            continue;
                        };
                        if state.frontier.contains(&url) || !seen.insert(url.clone()) {
                            continue;
                        }
                        hits.push(SearchHit { url, ..hit });
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(query = %q, provider = self.search.name(), error = %e, "Search failed");
                    out.errors.push(e.to_string());
                }
            }
        }

        if failures == fresh.len() {
            out.disable = Some(ActionKind::Search);
            out.summary = "search provider failed".into();
            return out;
        }
        if hits.is_empty() {
            out.disable = Some(ActionKind::Search);
            out.summary = "search returned no new URLs".into();
            return out;
        }

        let snippets: Vec<String> = hits
            .iter()
            .filter(|h| !h.snippet.trim().is_empty())
            .map(|h| format!("{}: {}", h.title, truncate_chars(&h.snippet, self.settings.snippet_chars)))
            .collect();
        if !snippets.is_empty() {
            let references = hits
                .iter()
                .filter(|h| !h.snippet.trim().is_empty())
                .map(|h| Reference::new(&h.url, truncate_chars(&h.snippet, self.settings.snippet_chars)))
                .collect();
            out.knowledge.push(KnowledgeItem::new(
                query,
                snippets.join("\n"),
                references,
                OriginAction::Search,
                step,
            ));
        }

        out.summary = format!("{} new URLs from {} queries", hits.len(), fresh.len());
        out.discovered = hits;
        out
    }

    async fn visit(
        &self,
        urls: &[String],
        question: &GapEntry,
        state: &ControllerState,
        step: u64,
    ) -> StepOutcome {
        let mut out = StepOutcome::default();

        let mut targets: Vec<String> = Vec::new();
        for raw in urls {
            match normalize_url(raw) {
                None => out.errors.push(format!("invalid URL: {raw}")),
                Some(url) if state.frontier.is_visited(&url) || targets.contains(&url) => {}
                Some(url) => targets.push(url),
            }
        }
        if targets.is_empty() {
            out.disable = Some(ActionKind::Visit);
            out.summary = "no unvisited URLs among the targets".into();
            return out;
        }

        let results: Vec<_> = futures::stream::iter(targets.iter().cloned())
            .map(|url| async move {
                let result = with_retry(&self.retry, || self.reader.read(&url)).await;
                (url, result)
            })
            .buffered(self.settings.visit_concurrency)
            .collect()
            .await;

        let mut pages: Vec<PageContent> = Vec::new();
        for (url, result) in results {
            out.visited.push(url.clone());
            match result {
                Ok(page) => {
                    out.charge(CostCategory::Read, page.usage);
                    if page.text.trim().chars().count() >= self.settings.min_content_chars {
                        pages.push(page);
                    } else {
                        debug!(url = %url, "Page had too little content");
                    }
                }
                Err(e) => {
                    warn!(url = %url, reader = self.reader.name(), error = %e, "Page read failed");
                    out.errors.push(e.to_string());
                }
            }
        }

        if pages.is_empty() {
            out.disable = Some(ActionKind::Visit);
            out.summary = format!("read {} URLs, none with usable content", out.visited.len());
            return out;
        }

        for page in &pages {
            let text = page.text.trim();
            out.knowledge.push(KnowledgeItem::new(
                question.text(),
                truncate_chars(text, PAGE_EXCERPT_CHARS),
                vec![Reference::new(
                    &page.url,
                    truncate_chars(text, self.settings.snippet_chars),
                )],
                OriginAction::Visit,
                step,
            ));
        }
        out.summary = format!("read {} of {} URLs", pages.len(), out.visited.len());
        out
    }

    async fn reflect(
        &self,
        sub_questions: &[String],
        question: &GapEntry,
        state: &ControllerState,
    ) -> StepOutcome {
        let mut out = StepOutcome::default();

        let query_key = normalize_question(state.query());
        let current_key = normalize_question(question.text());
        let mut seen = HashSet::new();
        let mut candidates: Vec<String> = sub_questions
            .iter()
            .filter(|q| {
                let key = normalize_question(q);
                key != query_key
                    && key != current_key
                    && !state.gaps.contains(q)
                    && !state.knowledge.has_answered(q)
                    && seen.insert(key)
            })
            .cloned()
            .collect();

        if self.settings.semantic_dedup && !candidates.is_empty() {
            let mut existing = state.gaps.questions();
            existing.extend(state.knowledge.answered_questions());
            existing.push(state.query().to_string());
            match self.dedup.filter(&candidates, &existing).await {
                Ok((unique, usage)) => {
                    out.charge_usage(CostCategory::Dedup, usage);
                    candidates = unique;
                }
                Err(e) => {
                    warn!(error = %e, "Semantic dedup failed; keeping exact-match filtered questions");
                    out.errors.push(format!("dedup failed: {e}"));
                }
            }
        }

        candidates.truncate(self.settings.max_sub_questions);
        if candidates.is_empty() {
            out.disable = Some(ActionKind::Reflect);
            out.summary = "no new sub-questions".into();
            return out;
        }

        out.summary = format!("{} new sub-questions", candidates.len());
        out.new_gaps = candidates;
        out
    }
}

fn answer(text: &str, references: &[Reference], question: &GapEntry, step: u64) -> StepOutcome {
    let mut out = StepOutcome::default();
    if question.is_original() {
        out.candidate = Some(CandidateAnswer {
            text: text.to_string(),
            references: references.to_vec(),
        });
        out.summary = "proposed an answer to the query".into();
    } else {
        out.knowledge.push(KnowledgeItem::new(
            question.text(),
            text,
            references.to_vec(),
            OriginAction::ReflectResolved,
            step,
        ));
        out.resolved = true;
        out.summary = "answered a sub-question".into();
    }
    out
}

/// Commit a step's outcome to the state.
pub fn apply_outcome(state: &mut ControllerState, step: u64, outcome: &StepOutcome) {
    for (category, units) in &outcome.charges {
        state.budget.charge(*category, *units);
    }
    for item in &outcome.knowledge {
        state.knowledge.add(item.clone());
    }
    for hit in &outcome.discovered {
        state.frontier.discover(&hit.url, &hit.title, &hit.snippet, step);
    }
    for url in &outcome.visited {
        state.frontier.mark_visited(url, step);
    }
    for q in &outcome.new_gaps {
        state.gaps.push_back(GapEntry::SubQuestion(q.clone()));
    }
    state.searched_queries.extend(outcome.searched.iter().cloned());
    if let Some(kind) = outcome.disable {
        state.disable_next(kind);
    }
}
