//! Core types shared across the research controller.
//!
//! Chat messages and completion request/response shapes for the model
//! collaborator, token usage accounting, and the action vocabulary the
//! controller reasons in.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a message sender in a chat exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Token usage statistics from a model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A request to the model collaborator.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub model: Option<String>,
    /// Ask the provider to constrain output to a single JSON object.
    pub json_mode: bool,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            temperature: 0.7,
            max_tokens: None,
            model: None,
            json_mode: false,
        }
    }
}

/// A completed model response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub message: Message,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}

impl CompletionResponse {
    /// The text content of the response.
    pub fn text(&self) -> &str {
        &self.message.content
    }
}

/// The four action types the controller can take in a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Search,
    Visit,
    Reflect,
    Answer,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Search,
        ActionKind::Visit,
        ActionKind::Reflect,
        ActionKind::Answer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Search => "search",
            ActionKind::Visit => "visit",
            ActionKind::Reflect => "reflect",
            ActionKind::Answer => "answer",
        }
    }

    /// Parse an action name as the model writes it. Case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "search" => Some(ActionKind::Search),
            "visit" | "read" => Some(ActionKind::Visit),
            "reflect" => Some(ActionKind::Reflect),
            "answer" => Some(ActionKind::Answer),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello, world!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, world!");
    }

    #[test]
    fn test_token_usage_accumulate() {
        let mut usage = TokenUsage::new(10, 5);
        usage.accumulate(&TokenUsage::new(3, 2));
        assert_eq!(usage.total(), 20);
        assert!(!usage.is_empty());
        assert!(TokenUsage::default().is_empty());
    }

    #[test]
    fn test_action_kind_parse() {
        assert_eq!(ActionKind::parse("Search"), Some(ActionKind::Search));
        assert_eq!(ActionKind::parse(" visit "), Some(ActionKind::Visit));
        assert_eq!(ActionKind::parse("read"), Some(ActionKind::Visit));
        assert_eq!(ActionKind::parse("ANSWER"), Some(ActionKind::Answer));
        assert_eq!(ActionKind::parse("browse"), None);
    }

    #[test]
    fn test_action_kind_serde() {
        let json = serde_json::to_string(&ActionKind::Reflect).unwrap();
        assert_eq!(json, "\"reflect\"");
        let parsed: ActionKind = serde_json::from_str("\"visit\"").unwrap();
        assert_eq!(parsed, ActionKind::Visit);
    }

    #[test]
    fn test_completion_request_default() {
        let req = CompletionRequest::default();
        assert!(req.messages.is_empty());
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(!req.json_mode);
    }
}
