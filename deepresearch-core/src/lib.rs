//! # DeepResearch Core
//!
//! Core library for the DeepResearch agent.
//! Provides the budget-aware research controller and its stores, the LLM
//! interface (brain), the search/reader collaborator contracts, retry policy,
//! configuration, and the HTTP/SSE gateway.

pub mod brain;
pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod research;
pub mod retry;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, LlmProvider, MockLlmProvider, ModelRole, TokenCounter};
pub use config::{ControllerConfig, ResearchConfig, RetryConfig};
pub use error::{
    CollaboratorError, ConfigError, ControllerError, InvalidDecision, LlmError, ResearchError,
    Result,
};
pub use gateway::{GatewayConfig, GatewayServer, SharedGateway};
pub use research::{
    ExitStatus, FinalAnswer, PageReader, ProgressEvent, ProgressSink, ResearchController,
    Researcher, SearchProvider,
};
pub use types::{ActionKind, CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
