//! Answer evaluation: is a candidate answer to the query definitive and referenced?

use super::knowledge::Reference;
use super::prompt;
use crate::brain::{Brain, ModelRole, parse_json_reply};
use crate::error::LlmError;
use crate::types::TokenUsage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// The evaluator's judgement of one candidate answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub definitive: bool,
    pub has_references: bool,
    pub reasoning: String,
}

impl Verdict {
    /// Accepted only when the answer is both definitive and referenced.
    pub fn accepted(&self) -> bool {
        self.definitive && self.has_references
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(alias = "definitive")]
    is_definitive: bool,
    #[serde(default)]
    reasoning: String,
}

pub struct AnswerEvaluator {
    brain: Arc<Brain>,
}

impl AnswerEvaluator {
    pub fn new(brain: Arc<Brain>) -> Self {
        Self { brain }
    }

    /// Judge a candidate answer to `question`.
    ///
    /// An unreferenced answer is rejected without a model call. A verdict the
    /// model garbles counts as a rejection. Only an unavailable evaluator
    /// model is an error.
    pub async fn evaluate(
        &self,
        question: &str,
        answer: &str,
        references: &[Reference],
    ) -> Result<(Verdict, TokenUsage), LlmError> {
        if references.is_empty() {
            return Ok((
                Verdict {
                    definitive: false,
                    has_references: false,
                    reasoning: "not assessed: the answer cites no references".into(),
                },
                TokenUsage::default(),
            ));
        }

        let reply = self
            .brain
            .complete(
                ModelRole::Evaluator,
                prompt::EVALUATOR_SYSTEM,
                &prompt::evaluator_prompt(question, answer),
            )
            .await?;

        let verdict = match parse_json_reply::<RawVerdict>(&reply.text) {
            Ok(raw) => Verdict {
                definitive: raw.is_definitive,
                has_references: true,
                reasoning: raw.reasoning,
            },
            Err(e) => {
                warn!(error = %e, "Evaluator reply could not be parsed; treating as rejection");
                Verdict {
                    definitive: false,
                    has_references: true,
                    reasoning: format!("evaluator reply could not be parsed: {e}"),
                }
            }
        };

        info!(
            definitive = verdict.definitive,
            reasoning = %verdict.reasoning,
            "Answer evaluated"
        );
        Ok((verdict, reply.usage))
    }
}
