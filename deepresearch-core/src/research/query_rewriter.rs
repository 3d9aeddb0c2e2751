//! Expands a search intent into up to three keyword queries.

use super::prompt;
use crate::brain::{Brain, ModelRole, parse_json_reply};
use crate::error::LlmError;
use crate::types::TokenUsage;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

const MAX_QUERIES: usize = 3;

#[derive(Debug, Deserialize)]
struct RewriteReply {
    #[serde(default)]
    think: String,
    queries: Vec<String>,
}

pub struct QueryRewriter {
    brain: Arc<Brain>,
}

impl QueryRewriter {
    pub fn new(brain: Arc<Brain>) -> Self {
        Self { brain }
    }

    /// Rewrite `query` into 1-3 distinct keyword queries.
    ///
    /// An empty or unparseable reply is a `ResponseParse` error; callers fall
    /// back to the raw query.
    pub async fn rewrite(
        &self,
        query: &str,
        intention: &str,
    ) -> Result<(Vec<String>, TokenUsage), LlmError> {
        let reply = self
            .brain
            .complete(
                ModelRole::QueryRewriter,
                prompt::QUERY_REWRITER_SYSTEM,
                &prompt::query_rewriter_prompt(query, intention),
            )
            .await?;

        let parsed: RewriteReply =
            parse_json_reply(&reply.text).map_err(|e| LlmError::ResponseParse {
                message: format!("query rewriter: {e}"),
            })?;

        let mut seen = HashSet::new();
        let queries: Vec<String> = parsed
            .queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty() && seen.insert(q.to_lowercase()))
            .take(MAX_QUERIES)
            .collect();

        if queries.is_empty() {
            return Err(LlmError::ResponseParse {
                message: "query rewriter returned no queries".into(),
            });
        }

        debug!(original = query, rewritten = ?queries, think = %parsed.think, "Query rewritten");
        Ok((queries, reply.usage))
    }
}
