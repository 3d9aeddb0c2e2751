//! The research loop.
//!
//! One controller serves one query. Each step pops a question from the gap
//! queue, asks the decision engine for an action, dispatches it, and commits
//! the outcome. The loop stops when the evaluator accepts an answer to the
//! query, when the budget is spent, or when the bad-attempt allowance runs
//! out; the last two hand over to beast mode.

use super::availability::ActionAvailability;
use super::beast::BeastModeFinalizer;
use super::budget::{BudgetSnapshot, CostCategory};
use super::collaborators::{PageReader, SearchProvider};
use super::decision::{DecisionContext, DecisionEngine, DecisionLimits, ProposedAction};
use super::dedup::SemanticDeduplicator;
use super::dispatch::{DispatchSettings, Dispatcher, StepOutcome, apply_outcome};
use super::error_analyzer::{ErrorAnalyzer, bare_lesson};
use super::evaluator::AnswerEvaluator;
use super::gaps::GapEntry;
use super::knowledge::{KnowledgeItem, OriginAction, Reference};
use super::progress::{ActionState, NoOpProgressSink, ProgressEvent, ProgressSink};
use super::query_rewriter::QueryRewriter;
use super::state::{ControllerState, DiaryEntry, Lesson};
use crate::brain::Brain;
use crate::config::{ControllerConfig, ResearchConfig, RetryConfig};
use crate::error::{ControllerError, Result};
use crate::types::{ActionKind, TokenUsage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a successful run ended. Failed runs return `Err` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitStatus {
    /// Accepted by the evaluator.
    Answered,
    /// Produced by beast mode, never evaluated.
    AnsweredUnverified,
}

impl ExitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitStatus::Answered => "answered",
            ExitStatus::AnsweredUnverified => "answered-unverified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub status: ExitStatus,
    pub answer: String,
    pub references: Vec<Reference>,
    pub steps: u64,
    pub budget: BudgetSnapshot,
    pub bad_attempts: u32,
}

/// Shared collaborators and settings; builds one controller per query.
#[derive(Clone)]
pub struct Researcher {
    brain: Arc<Brain>,
    search: Arc<dyn SearchProvider>,
    reader: Arc<dyn PageReader>,
    controller: ControllerConfig,
    retry: RetryConfig,
}

impl Researcher {
    pub fn new(
        brain: Arc<Brain>,
        search: Arc<dyn SearchProvider>,
        reader: Arc<dyn PageReader>,
    ) -> Self {
        Self {
            brain,
            search,
            reader,
            controller: ControllerConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn from_config(
        brain: Arc<Brain>,
        search: Arc<dyn SearchProvider>,
        reader: Arc<dyn PageReader>,
        config: &ResearchConfig,
    ) -> Self {
        Self::new(brain, search, reader)
            .with_controller_config(config.controller.clone())
            .with_retry(config.retry.clone())
    }

    pub fn with_controller_config(mut self, config: ControllerConfig) -> Self {
        self.controller = config;
        self
    }

    /// Retry policy for search and reader calls.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.controller
    }

    /// A fresh controller with its own state, reporting to no one.
    pub fn controller(&self) -> ResearchController {
        let brain = &self.brain;
        ResearchController {
            decision: DecisionEngine::new(brain.clone(), DecisionLimits::from(&self.controller)),
            dispatcher: Dispatcher::new(
                self.search.clone(),
                self.reader.clone(),
                QueryRewriter::new(brain.clone()),
                SemanticDeduplicator::new(brain.clone()),
                self.retry.clone(),
                DispatchSettings::from(&self.controller),
            ),
            evaluator: AnswerEvaluator::new(brain.clone()),
            analyzer: ErrorAnalyzer::new(brain.clone()),
            beast: BeastModeFinalizer::new(brain.clone()),
            config: self.controller.clone(),
            sink: Arc::new(NoOpProgressSink),
            cancel: CancellationToken::new(),
        }
    }
}

pub struct ResearchController {
    config: ControllerConfig,
    decision: DecisionEngine,
    dispatcher: Dispatcher,
    evaluator: AnswerEvaluator,
    analyzer: ErrorAnalyzer,
    beast: BeastModeFinalizer,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

/// Result of the evaluation gate for one candidate answer.
enum Gate {
    Accepted,
    Rejected(String),
}

impl ResearchController {
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Research `query` until an answer is accepted or the budget runs out.
    ///
    /// Emits one progress event per step and exactly one terminal event
    /// (answer or error).
    pub async fn run(
        &self,
        query: &str,
        budget_ceiling: u64,
        max_bad_attempts: u32,
    ) -> Result<FinalAnswer> {
        let query = query.trim();
        let mut state = ControllerState::new(query, budget_ceiling);
        info!(query, budget = budget_ceiling, max_bad_attempts, "Research started");

        let result = if query.is_empty() {
            Err(ControllerError::EmptyQuery.into())
        } else if budget_ceiling == 0 {
            Err(ControllerError::ZeroLimit { name: "budget" }.into())
        } else if max_bad_attempts == 0 {
            Err(ControllerError::ZeroLimit {
                name: "max_bad_attempts",
            }
            .into())
        } else {
            self.research(&mut state, max_bad_attempts).await
        };

        match result {
            Ok(answer) => {
                info!(
                    status = answer.status.as_str(),
                    steps = answer.steps,
                    consumed = answer.budget.used,
                    budget = answer.budget.total,
                    "Research finished"
                );
                self.sink.emit(ProgressEvent::answer(answer.clone()));
                Ok(answer)
            }
            Err(e) => {
                error!(
                    error = %e,
                    steps = state.budget.steps(),
                    consumed = state.budget.consumed(),
                    "Research failed"
                );
                self.sink.emit(ProgressEvent::error(
                    state.budget.steps(),
                    state.budget.snapshot(),
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    async fn research(
        &self,
        state: &mut ControllerState,
        max_bad_attempts: u32,
    ) -> Result<FinalAnswer> {
        while !state.budget.is_exhausted() {
            if state.bad_attempts >= max_bad_attempts {
                info!(bad_attempts = state.bad_attempts, "Bad attempts exhausted");
                break;
            }
            if self.cancel.is_cancelled() {
                return Err(ControllerError::Cancelled.into());
            }

            let consumed_at_start = state.budget.consumed();
            let step = state.budget.begin_step();
            let availability = state.refresh_availability();
            if !availability.any_enabled() {
                return Err(ControllerError::InvariantViolation {
                    message: format!("no action available at step {step}"),
                }
                .into());
            }

            if state.gaps.is_empty() {
                state.gaps.push_back(GapEntry::Original(state.query().to_string()));
            }
            let Some(question) = state.gaps.pop_front() else {
                return Err(ControllerError::InvariantViolation {
                    message: "gap queue empty after refill".into(),
                }
                .into());
            };

            let reply = {
                let ctx = DecisionContext::from_state(state, &question, step, &self.config);
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(ControllerError::Cancelled.into()),
                    reply = self.decision.decide(&ctx) => reply?,
                }
            };
            charge(state, CostCategory::Decision, reply.usage);

            let proposed = match reply.outcome {
                Ok(proposed) => proposed,
                Err(invalid) => {
                    let fallback = invalid
                        .proposed
                        .filter(|k| *k != ActionKind::Answer)
                        .unwrap_or(ActionKind::Search);
                    state.disable_next(fallback);
                    state.gaps.push_front(question.clone());
                    let action_state = ActionState {
                        question: question.text().to_string(),
                        action: None,
                        think: String::new(),
                        params: serde_json::Value::Null,
                        summary: format!("decision rejected, {fallback} disabled for next step"),
                        references: Vec::new(),
                        gaps: state.gaps.questions(),
                        bad_attempts: state.bad_attempts,
                        availability,
                        rejection: Some(invalid.reason.clone()),
                        errors: vec![invalid.to_string()],
                    };
                    self.finish_step(state, step, consumed_at_start, action_state);
                    continue;
                }
            };

            info!(
                step,
                action = %proposed.kind(),
                question = question.text(),
                consumed = state.budget.consumed(),
                budget = state.budget.ceiling(),
                "Executing action"
            );

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ControllerError::Cancelled.into()),
                outcome = self.dispatcher.dispatch(&proposed, &question, state, step) => outcome,
            };

            let gate = match &outcome.candidate {
                Some(candidate) => {
                    let (verdict, usage) = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(ControllerError::Cancelled.into()),
                        evaluated = self.evaluator.evaluate(
                            state.query(),
                            &candidate.text,
                            &candidate.references,
                        ) => evaluated?,
                    };
                    charge(state, CostCategory::Evaluator, usage);
                    Some(if verdict.accepted() {
                        Gate::Accepted
                    } else {
                        Gate::Rejected(verdict.reasoning)
                    })
                }
                None => None,
            };

            apply_outcome(state, step, &outcome);
            state.diary.push(DiaryEntry {
                step,
                question: question.text().to_string(),
                action: Some(proposed.kind()),
                think: proposed.think.clone(),
                summary: outcome.summary.clone(),
            });

            let mut rejection = None;
            match (gate, &outcome.candidate) {
                (Some(Gate::Accepted), Some(candidate)) => {
                    let action_state =
                        self.action_state(state, &question, &proposed, &outcome, availability, None);
                    self.finish_step(state, step, consumed_at_start, action_state);
                    return Ok(FinalAnswer {
                        status: ExitStatus::Answered,
                        answer: candidate.text.clone(),
                        references: candidate.references.clone(),
                        steps: state.budget.steps(),
                        budget: state.budget.snapshot(),
                        bad_attempts: state.bad_attempts,
                    });
                }
                (Some(Gate::Rejected(reason)), Some(candidate)) => {
                    state.bad_attempts += 1;
                    warn!(
                        step,
                        bad_attempts = state.bad_attempts,
                        reason = %reason,
                        "Answer rejected"
                    );
                    let (lesson, usage) = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(ControllerError::Cancelled.into()),
                        learned = self.learn(state, question.text(), &candidate.text, &reason) => learned,
                    };
                    charge(state, CostCategory::ErrorAnalyzer, usage);
                    state.lessons.push(lesson);
                    state.reset_question_context(question.text());
                    state.gaps.push_back(question.clone());
                    rejection = Some(reason);
                }
                _ => {
                    if !outcome.resolved {
                        state.gaps.push_back(question.clone());
                    }
                }
            }

            let action_state =
                self.action_state(state, &question, &proposed, &outcome, availability, rejection);
            self.finish_step(state, step, consumed_at_start, action_state);

            if self.config.step_delay_ms > 0 {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(ControllerError::Cancelled.into()),
                    _ = tokio::time::sleep(Duration::from_millis(self.config.step_delay_ms)) => {}
                }
            }
        }

        self.finalize(state).await
    }

    async fn finalize(&self, state: &mut ControllerState) -> Result<FinalAnswer> {
        info!(
            steps = state.budget.steps(),
            consumed = state.budget.consumed(),
            budget = state.budget.ceiling(),
            knowledge = state.knowledge.len(),
            "Entering beast mode"
        );
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ControllerError::Cancelled.into()),
            outcome = self.beast.finalize(state.query(), &state.knowledge) => outcome,
        };
        charge(state, CostCategory::BeastMode, outcome.usage);

        let step = state.budget.steps();
        let item = KnowledgeItem::new(
            state.query(),
            outcome.answer.clone(),
            outcome.references.clone(),
            OriginAction::BeastMode,
            step,
        );
        state.knowledge.add(item);

        Ok(FinalAnswer {
            status: ExitStatus::AnsweredUnverified,
            answer: outcome.answer,
            references: outcome.references,
            steps: step,
            budget: state.budget.snapshot(),
            bad_attempts: state.bad_attempts,
        })
    }

    /// Analyze a rejected answer. Never fails; a broken analyzer yields a bare lesson.
    async fn learn(
        &self,
        state: &ControllerState,
        question: &str,
        answer: &str,
        rejection: &str,
    ) -> (Lesson, TokenUsage) {
        if !self.config.analyze_errors {
            return (bare_lesson(answer, rejection), TokenUsage::default());
        }
        let diary = state.diary_for(question);
        match self.analyzer.analyze(question, &diary, answer, rejection).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, "Error analysis failed");
                (bare_lesson(answer, rejection), TokenUsage::default())
            }
        }
    }

    fn action_state(
        &self,
        state: &ControllerState,
        question: &GapEntry,
        proposed: &ProposedAction,
        outcome: &StepOutcome,
        availability: ActionAvailability,
        rejection: Option<String>,
    ) -> ActionState {
        let references = match &outcome.candidate {
            Some(candidate) => candidate.references.clone(),
            None => outcome.references(),
        };
        ActionState {
            question: question.text().to_string(),
            action: Some(proposed.kind()),
            think: proposed.think.clone(),
            params: proposed.decision.params(),
            summary: outcome.summary.clone(),
            references,
            gaps: state.gaps.questions(),
            bad_attempts: state.bad_attempts,
            availability,
            rejection,
            errors: outcome.errors.clone(),
        }
    }

    fn finish_step(
        &self,
        state: &mut ControllerState,
        step: u64,
        consumed_at_start: u64,
        action_state: ActionState,
    ) {
        state.budget.finish_step(consumed_at_start);
        debug!(
            step,
            consumed = state.budget.consumed(),
            budget = state.budget.ceiling(),
            gaps = state.gaps.len(),
            knowledge = state.knowledge.len(),
            "Step finished"
        );
        self.sink
            .emit(ProgressEvent::progress(step, state.budget.snapshot(), action_state));
    }
}

fn charge(state: &mut ControllerState, category: CostCategory, usage: TokenUsage) {
    state.budget.charge(category, usage.total() as u64);
}
