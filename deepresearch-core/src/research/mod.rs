//! Deep research controller: a budget-aware search/visit/reflect/answer loop.
//!
//! The controller owns five stores per run:
//! - **Knowledge**: append-only (question, answer, references) items
//! - **Frontier**: discovered vs. visited URLs
//! - **Gaps**: FIFO queue of open questions, seeded with the query
//! - **Budget**: consumed units and per-category breakdown
//! - **Availability**: per-step mask of allowed actions
//!
//! Model-backed helpers (decision, evaluation, query rewriting, dedup, error
//! analysis, beast mode) all go through the [`Brain`](crate::brain::Brain).

pub mod availability;
pub mod beast;
pub mod budget;
pub mod collaborators;
pub mod controller;
pub mod decision;
pub mod dedup;
pub mod dispatch;
pub mod error_analyzer;
pub mod evaluator;
pub mod frontier;
pub mod gaps;
pub mod knowledge;
pub mod progress;
pub mod prompt;
pub mod query_rewriter;
pub mod session;
pub mod state;

pub use availability::ActionAvailability;
pub use budget::{BudgetSnapshot, BudgetTracker, CostCategory};
pub use collaborators::{
    PageContent, PageReader, SearchHit, SearchProvider, SearchResults, StaticPageReader,
    StaticSearchProvider,
};
pub use controller::{ExitStatus, FinalAnswer, ResearchController, Researcher};
pub use decision::{Decision, DecisionEngine, ProposedAction};
pub use frontier::{FrontierEntry, UrlFrontier};
pub use gaps::{GapEntry, GapQueue};
pub use knowledge::{KnowledgeItem, KnowledgeStore, OriginAction, Reference};
pub use progress::{
    ActionState, ChannelProgressSink, EventData, EventKind, NoOpProgressSink, ProgressEvent,
    ProgressSink, RecordingProgressSink,
};
pub use session::{TaskRecord, TaskStatus};
pub use state::ControllerState;
