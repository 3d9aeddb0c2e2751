//! Error types for the research controller.
//!
//! Uses `thiserror` for structured error variants covering the language model,
//! the search/retrieval collaborators, configuration, and the controller loop.
//! `InvalidDecision` never escapes a run; the controller turns it into a
//! rejected step.

use crate::types::ActionKind;

/// Top-level error type for the DeepResearch core library.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from language model provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Provider server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Tokenizer unavailable: {message}")]
    Tokenizer { message: String },
}

/// Errors from the search and page-retrieval collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: String,
        message: String,
    },

    #[error("{collaborator} rejected the request: insufficient balance")]
    InsufficientBalance { collaborator: String },

    #[error("{collaborator} rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        collaborator: String,
        retry_after_secs: u64,
    },

    #[error("{collaborator} timed out after {timeout_secs}s")]
    Timeout {
        collaborator: String,
        timeout_secs: u64,
    },

    #[error("{collaborator} returned an invalid response: {message}")]
    InvalidResponse {
        collaborator: String,
        message: String,
    },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Authentication failed for {collaborator}: {message}")]
    AuthFailed {
        collaborator: String,
        message: String,
    },
}

/// The model proposed a disabled or malformed action.
///
/// `proposed` carries the action type when it could be identified, so the
/// controller can disable exactly that action for the next step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid decision: {reason}")]
pub struct InvalidDecision {
    pub proposed: Option<ActionKind>,
    pub reason: String,
}

impl InvalidDecision {
    pub fn new(proposed: Option<ActionKind>, reason: impl Into<String>) -> Self {
        Self {
            proposed,
            reason: reason.into(),
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },

    #[error("Unknown {kind} provider: {name}")]
    UnknownProvider { kind: String, name: String },
}

/// Errors raised by the controller loop itself.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Research run was cancelled")]
    Cancelled,

    #[error("Query must not be empty")]
    EmptyQuery,

    #[error("{name} must be at least 1")]
    ZeroLimit { name: &'static str },

    #[error("Controller invariant violated: {message}")]
    InvariantViolation { message: String },
}

/// Result type alias for DeepResearch operations.
pub type Result<T> = std::result::Result<T, ResearchError>;
