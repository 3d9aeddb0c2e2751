//! Decision engine: asks the model for the next action and validates it.
//!
//! The reply is a single JSON object:
//! `{"action", "think", "searchQuery", "URLTargets", "questionsToAnswer", "answer", "references"}`.
//! Anything malformed, or naming an action the current mask disables, becomes
//! an [`InvalidDecision`]; the controller never executes it.

use super::availability::ActionAvailability;
use super::frontier::FrontierEntry;
use super::gaps::{GapEntry, normalize_question};
use super::knowledge::{KnowledgeItem, Reference};
use super::prompt;
use super::state::{ControllerState, DiaryEntry, Lesson};
use crate::brain::{Brain, ModelRole, parse_json_reply};
use crate::config::ControllerConfig;
use crate::error::{InvalidDecision, LlmError};
use crate::types::{ActionKind, TokenUsage};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// A validated action with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Decision {
    Search { query: String },
    Visit { urls: Vec<String> },
    Reflect { sub_questions: Vec<String> },
    Answer { text: String, references: Vec<Reference> },
}

impl Decision {
    pub fn kind(&self) -> ActionKind {
        match self {
            Decision::Search { .. } => ActionKind::Search,
            Decision::Visit { .. } => ActionKind::Visit,
            Decision::Reflect { .. } => ActionKind::Reflect,
            Decision::Answer { .. } => ActionKind::Answer,
        }
    }

    /// Parameters as reported in progress events.
    pub fn params(&self) -> serde_json::Value {
        match self {
            Decision::Search { query } => serde_json::json!({ "searchQuery": query }),
            Decision::Visit { urls } => serde_json::json!({ "URLTargets": urls }),
            Decision::Reflect { sub_questions } => {
                serde_json::json!({ "questionsToAnswer": sub_questions })
            }
            Decision::Answer { text, references } => serde_json::json!({
                "answer": text,
                "references": references,
            }),
        }
    }
}

/// The model's choice for this step plus its stated reasoning.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedAction {
    pub think: String,
    pub decision: Decision,
}

impl ProposedAction {
    pub fn kind(&self) -> ActionKind {
        self.decision.kind()
    }
}

#[derive(Debug, Deserialize)]
struct RawReference {
    #[serde(default, alias = "snippet", alias = "exact_quote")]
    #[serde(rename = "exactQuote")]
    exact_quote: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    action: String,
    #[serde(default)]
    think: String,
    #[serde(default, rename = "searchQuery", alias = "search_query")]
    search_query: Option<String>,
    #[serde(default, rename = "URLTargets", alias = "urls")]
    url_targets: Vec<String>,
    #[serde(default, rename = "questionsToAnswer", alias = "questions")]
    questions_to_answer: Vec<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    answer: Option<String>,
    #[serde(default)]
    references: Vec<RawReference>,
}

/// Read a string, number or boolean as text; models sometimes answer `2`
/// instead of `"2"`.
fn scalar_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    use serde_json::Value;
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "answer must be text, got {other}"
        ))),
    }
}

/// Caps applied while validating a decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionLimits {
    pub max_urls: usize,
    pub max_sub_questions: usize,
}

impl From<&ControllerConfig> for DecisionLimits {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            max_urls: config.max_urls_per_visit.max(1),
            max_sub_questions: config.max_sub_questions.max(1),
        }
    }
}

impl Default for DecisionLimits {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

/// Parse and validate a decision reply against this step's mask.
pub fn parse_decision(
    text: &str,
    availability: &ActionAvailability,
    limits: DecisionLimits,
) -> Result<ProposedAction, InvalidDecision> {
    let raw: RawDecision = parse_json_reply(text)
        .map_err(|e| InvalidDecision::new(None, format!("malformed decision: {e}")))?;

    let kind = ActionKind::parse(&raw.action).ok_or_else(|| {
        InvalidDecision::new(None, format!("unknown action '{}'", raw.action))
    })?;

    if !availability.is_enabled(kind) {
        return Err(InvalidDecision::new(
            Some(kind),
            format!("action '{kind}' is not available this step"),
        ));
    }

    let decision = match kind {
        ActionKind::Search => {
            let query = raw.search_query.unwrap_or_default().trim().to_string();
            if query.is_empty() {
                return Err(InvalidDecision::new(Some(kind), "search without a query"));
            }
            Decision::Search { query }
        }
        ActionKind::Visit => {
            let mut seen = HashSet::new();
            let urls: Vec<String> = raw
                .url_targets
                .into_iter()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty() && seen.insert(u.clone()))
                .take(limits.max_urls)
                .collect();
            if urls.is_empty() {
                return Err(InvalidDecision::new(Some(kind), "visit without URLs"));
            }
            Decision::Visit { urls }
        }
        ActionKind::Reflect => {
            let mut seen = HashSet::new();
            let sub_questions: Vec<String> = raw
                .questions_to_answer
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty() && seen.insert(normalize_question(q)))
                .take(limits.max_sub_questions)
                .collect();
            if sub_questions.is_empty() {
                return Err(InvalidDecision::new(Some(kind), "reflect without questions"));
            }
            Decision::Reflect { sub_questions }
        }
        ActionKind::Answer => {
            let text = raw.answer.unwrap_or_default().trim().to_string();
            if text.is_empty() {
                return Err(InvalidDecision::new(Some(kind), "answer without text"));
            }
            let references = raw
                .references
                .into_iter()
                .filter(|r| !r.url.trim().is_empty())
                .map(|r| Reference::new(r.url.trim(), r.exact_quote))
                .collect();
            Decision::Answer { text, references }
        }
    };

    Ok(ProposedAction {
        think: raw.think,
        decision,
    })
}

/// Everything the decision model sees for one step.
#[derive(Debug, Clone)]
pub struct DecisionContext<'a> {
    pub step: u64,
    pub query: &'a str,
    pub question: &'a GapEntry,
    pub knowledge: &'a [KnowledgeItem],
    pub frontier: Vec<&'a FrontierEntry>,
    pub open_gaps: Vec<String>,
    pub diary: Vec<&'a DiaryEntry>,
    pub lessons: &'a [Lesson],
    pub availability: ActionAvailability,
    pub bad_attempts: u32,
}

impl<'a> DecisionContext<'a> {
    /// Windowed view of the state for the question being worked on.
    pub fn from_state(
        state: &'a ControllerState,
        question: &'a GapEntry,
        step: u64,
        config: &ControllerConfig,
    ) -> Self {
        let diary = state.diary_for(question.text());
        let diary_start = diary.len().saturating_sub(config.diary_window);
        Self {
            step,
            query: state.query(),
            question,
            knowledge: state.knowledge.recent(config.knowledge_window),
            frontier: state
                .frontier
                .unvisited()
                .take(config.frontier_window)
                .collect(),
            open_gaps: state.gaps.questions(),
            diary: diary[diary_start..].to_vec(),
            lessons: &state.lessons,
            availability: state.availability,
            bad_attempts: state.bad_attempts,
        }
    }
}

/// Result of one decision call: usage is always reported, the outcome may be invalid.
#[derive(Debug, Clone)]
pub struct DecisionReply {
    pub usage: TokenUsage,
    pub outcome: Result<ProposedAction, InvalidDecision>,
}

pub struct DecisionEngine {
    brain: Arc<Brain>,
    limits: DecisionLimits,
}

impl DecisionEngine {
    pub fn new(brain: Arc<Brain>, limits: DecisionLimits) -> Self {
        Self { brain, limits }
    }

    /// Ask the model for the next action.
    ///
    /// Returns `Err` only when the decision model itself is unavailable.
    pub async fn decide(&self, ctx: &DecisionContext<'_>) -> Result<DecisionReply, LlmError> {
        let user = prompt::decision_prompt(ctx);
        let reply = match self
            .brain
            .complete(ModelRole::Decision, prompt::DECISION_SYSTEM, &user)
            .await
        {
            Ok(reply) => reply,
            Err(LlmError::ResponseParse { message }) => {
                warn!(step = ctx.step, error = %message, "Decision reply could not be parsed");
                return Ok(DecisionReply {
                    usage: TokenUsage::default(),
                    outcome: Err(InvalidDecision::new(None, message)),
                });
            }
            Err(e) => return Err(e),
        };

        let outcome = parse_decision(&reply.text, &ctx.availability, self.limits);
        match &outcome {
            Ok(proposed) => debug!(
                step = ctx.step,
                action = %proposed.kind(),
                "Decision accepted"
            ),
            Err(e) => warn!(step = ctx.step, reason = %e.reason, "Decision rejected"),
        }
        Ok(DecisionReply {
            usage: reply.usage,
            outcome,
        })
    }
}
