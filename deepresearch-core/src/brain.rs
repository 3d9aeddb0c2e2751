//! Brain module: language model abstraction.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions and the
//! `Brain`, which applies per-role sampling settings, the retry policy, and
//! usage normalization on top of a provider.

use crate::config::{RetryConfig, RoleTemperatures};
use crate::error::LlmError;
use crate::retry::with_retry;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Trait for language model providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Estimate the token count for a set of messages.
    fn estimate_tokens(&self, messages: &[Message]) -> usize;
}

/// Token counter using tiktoken-rs for BPE tokenization.
pub struct TokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

impl TokenCounter {
    /// Create a token counter for the given model.
    /// Falls back to cl100k_base if the model isn't recognized.
    pub fn for_model(model: &str) -> Result<Self, LlmError> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => tiktoken_rs::cl100k_base().map_err(|e| LlmError::Tokenizer {
                message: e.to_string(),
            })?,
        };
        Ok(Self { bpe })
    }

    /// Count the number of tokens in a string.
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Count tokens for a set of messages, plus four per message for the
    /// role and separators.
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| 4 + self.count(&m.content)).sum()
    }
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCounter").finish_non_exhaustive()
    }
}

/// The purpose of a model call. Each role has its own temperature and cost category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelRole {
    Decision,
    Evaluator,
    QueryRewriter,
    Dedup,
    ErrorAnalyzer,
    BeastMode,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Decision => "decision",
            ModelRole::Evaluator => "evaluator",
            ModelRole::QueryRewriter => "query-rewriter",
            ModelRole::Dedup => "dedup",
            ModelRole::ErrorAnalyzer => "error-analyzer",
            ModelRole::BeastMode => "beast-mode",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RoleTemperatures {
    pub fn for_role(&self, role: ModelRole) -> f32 {
        match role {
            ModelRole::Decision => self.decision,
            ModelRole::Evaluator => self.evaluator,
            ModelRole::QueryRewriter => self.query_rewriter,
            ModelRole::Dedup => self.dedup,
            ModelRole::ErrorAnalyzer => self.error_analyzer,
            ModelRole::BeastMode => self.beast_mode,
        }
    }
}

/// A model reply reduced to its text and normalized usage.
#[derive(Debug, Clone)]
pub struct BrainReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// The Brain wraps a provider with retry and per-role sampling settings.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    retry: RetryConfig,
    temperatures: RoleTemperatures,
    max_tokens: Option<usize>,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>, retry: RetryConfig) -> Self {
        Self {
            provider,
            retry,
            temperatures: RoleTemperatures::default(),
            max_tokens: None,
        }
    }

    pub fn with_temperatures(mut self, temperatures: RoleTemperatures) -> Self {
        self.temperatures = temperatures;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<usize>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Run one JSON-mode completion for `role`, retrying transient failures.
    ///
    /// When the provider reports no usage, both sides are counted with the
    /// provider's tokenizer so the budget still advances.
    pub async fn complete(
        &self,
        role: ModelRole,
        system: &str,
        user: &str,
    ) -> Result<BrainReply, LlmError> {
        let request = CompletionRequest {
            messages: vec![Message::system(system), Message::user(user)],
            temperature: self.temperatures.for_role(role),
            max_tokens: self.max_tokens,
            model: None,
            json_mode: true,
        };

        let response = with_retry(&self.retry, || self.provider.complete(request.clone())).await?;

        let text = response.message.content;
        let usage = if response.usage.is_empty() {
            let reply = [Message::assistant(text.as_str())];
            TokenUsage::new(
                self.provider.estimate_tokens(&request.messages),
                self.provider.estimate_tokens(&reply).max(1),
            )
        } else {
            response.usage
        };

        debug!(
            role = %role,
            model = %response.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Model call completed"
        );

        Ok(BrainReply { text, usage })
    }
}

/// Extract the JSON object from a model reply and deserialize it.
///
/// Tolerates Markdown code fences and prose around the object by slicing from
/// the first `{` to the last `}`.
pub fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let trimmed = text.trim();
    let slice = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };
    serde_json::from_str(slice)
}

/// A scripted provider for tests.
///
/// Replies are served in FIFO order; once the queue is empty every call gets
/// the fallback text.
pub struct MockLlmProvider {
    model: String,
    replies: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    fallback: String,
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            fallback: "Mock response".to_string(),
        }
    }

    /// Replace the text returned once the queue runs dry.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.lock_replies().push_back(Ok(response));
    }

    /// Queue a text reply.
    pub fn queue_text(&self, text: &str) {
        self.queue_response(Self::text_response(text));
    }

    /// Queue a JSON reply.
    pub fn queue_json(&self, value: serde_json::Value) {
        self.queue_text(&value.to_string());
    }

    /// Queue an error for the next call.
    pub fn queue_error(&self, error: LlmError) {
        self.lock_replies().push_back(Err(error));
    }

    /// Create a simple text response with fixed usage.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage::new(100, 50),
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn pending(&self) -> usize {
        self.lock_replies().len()
    }

    fn lock_replies(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<CompletionResponse, LlmError>>> {
        self.replies.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        match self.lock_replies().pop_front() {
            Some(reply) => reply,
            None => Ok(Self::text_response(&self.fallback)),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    // Rough estimate: ~4 chars per token
    fn estimate_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| m.content.len() / 4 + 4).sum()
    }
}
