//! Forced final answer once the budget or the bad-attempt allowance runs out.
//!
//! Never fails: if the model is unavailable the answer is assembled directly
//! from the knowledge store.

use super::knowledge::{KnowledgeStore, Reference};
use super::prompt::{self, truncate_chars};
use crate::brain::{Brain, ModelRole, parse_json_reply};
use crate::types::TokenUsage;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// How many store references are attached when the model cites none.
const FALLBACK_REFERENCES: usize = 3;
/// How many knowledge items feed the prompt and the offline synthesis.
const KNOWLEDGE_WINDOW: usize = 30;

#[derive(Debug, Clone)]
pub struct BeastOutcome {
    pub answer: String,
    pub references: Vec<Reference>,
    pub usage: TokenUsage,
    /// True when the answer was assembled without the model.
    pub fallback: bool,
}

#[derive(Debug, Deserialize)]
struct BeastReference {
    #[serde(default, rename = "exactQuote", alias = "snippet")]
    exact_quote: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct BeastReply {
    answer: String,
    #[serde(default)]
    references: Vec<BeastReference>,
}

pub struct BeastModeFinalizer {
    brain: Arc<Brain>,
}

impl BeastModeFinalizer {
    pub fn new(brain: Arc<Brain>) -> Self {
        Self { brain }
    }

    pub async fn finalize(&self, query: &str, knowledge: &KnowledgeStore) -> BeastOutcome {
        if knowledge.is_empty() {
            return BeastOutcome {
                answer: format!(
                    "Insufficient information was gathered to answer: {query}"
                ),
                references: Vec::new(),
                usage: TokenUsage::default(),
                fallback: true,
            };
        }

        let store_refs = knowledge.references();
        let user = prompt::beast_mode_prompt(query, knowledge.recent(KNOWLEDGE_WINDOW), &store_refs);
        let reply = match self
            .brain
            .complete(ModelRole::BeastMode, prompt::BEAST_MODE_SYSTEM, &user)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Beast mode model unavailable; synthesizing from knowledge");
                return synthesize(query, knowledge, TokenUsage::default());
            }
        };

        let parsed = match parse_json_reply::<BeastReply>(&reply.text) {
            Ok(parsed) if !parsed.answer.trim().is_empty() => parsed,
            Ok(_) | Err(_) => {
                warn!("Beast mode reply unusable; synthesizing from knowledge");
                return synthesize(query, knowledge, reply.usage);
            }
        };

        let mut references: Vec<Reference> = Vec::new();
        for r in parsed.references {
            let url = r.url.trim();
            if knowledge.contains_url(url) && !references.iter().any(|x| x.url == url) {
                references.push(Reference::new(url, r.exact_quote));
            }
        }
        if references.is_empty() {
            references = store_refs.into_iter().take(FALLBACK_REFERENCES).collect();
        }

        BeastOutcome {
            answer: parsed.answer.trim().to_string(),
            references,
            usage: reply.usage,
            fallback: false,
        }
    }
}

/// Stitch the recent knowledge answers together.
fn synthesize(query: &str, knowledge: &KnowledgeStore, usage: TokenUsage) -> BeastOutcome {
    let mut answer = format!("Best available answer to \"{query}\" from the research so far:\n");
    for item in knowledge.recent(KNOWLEDGE_WINDOW) {
        answer.push_str("\n- ");
        answer.push_str(&truncate_chars(&item.answer, 400));
    }
    BeastOutcome {
        answer,
        references: knowledge
            .references()
            .into_iter()
            .take(FALLBACK_REFERENCES)
            .collect(),
        usage,
        fallback: true,
    }
}
