//! Semantic de-duplication of candidate sub-questions against known ones.

use super::gaps::normalize_question;
use super::prompt;
use crate::brain::{Brain, ModelRole, parse_json_reply};
use crate::error::LlmError;
use crate::types::TokenUsage;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct DedupReply {
    #[serde(alias = "queries", alias = "unique_queries")]
    unique_questions: Vec<String>,
}

pub struct SemanticDeduplicator {
    brain: Arc<Brain>,
}

impl SemanticDeduplicator {
    pub fn new(brain: Arc<Brain>) -> Self {
        Self { brain }
    }

    /// Keep the candidates that are not near-duplicates of each other or of `existing`.
    ///
    /// The result is always a subset of `candidates` in their original order;
    /// anything the model invents is dropped.
    pub async fn filter(
        &self,
        candidates: &[String],
        existing: &[String],
    ) -> Result<(Vec<String>, TokenUsage), LlmError> {
        if candidates.is_empty() {
            return Ok((Vec::new(), TokenUsage::default()));
        }

        let reply = self
            .brain
            .complete(
                ModelRole::Dedup,
                prompt::DEDUP_SYSTEM,
                &prompt::dedup_prompt(candidates, existing),
            )
            .await?;

        let parsed: DedupReply =
            parse_json_reply(&reply.text).map_err(|e| LlmError::ResponseParse {
                message: format!("dedup: {e}"),
            })?;

        let kept: Vec<String> = parsed
            .unique_questions
            .iter()
            .map(|q| normalize_question(q))
            .collect();
        let unique = candidates
            .iter()
            .filter(|c| kept.contains(&normalize_question(c)))
            .cloned()
            .collect();
        Ok((unique, reply.usage))
    }
}
