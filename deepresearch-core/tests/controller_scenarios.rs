//! End-to-end runs of the research controller against scripted collaborators.

use deepresearch_core::brain::{Brain, MockLlmProvider};
use deepresearch_core::config::{ControllerConfig, RetryConfig};
use deepresearch_core::error::{CollaboratorError, ControllerError, ResearchError};
use deepresearch_core::research::{
    CostCategory, EventData, EventKind, ExitStatus, ProgressEvent, RecordingProgressSink,
    Researcher, SearchHit, StaticPageReader, StaticSearchProvider,
};
use deepresearch_core::types::ActionKind;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const QUERY: &str = "Who designed the Rust programming language?";
const RUST_URL: &str = "https://rust-lang.org/";
const PAGE_TEXT: &str = "Rust began as a personal project by Graydon Hoare at Mozilla in 2006. \
    Mozilla sponsored the project from 2009 and the first stable release, Rust 1.0, shipped in May 2015.";

fn config() -> ControllerConfig {
    ControllerConfig {
        rewrite_queries: false,
        semantic_dedup: false,
        analyze_errors: false,
        ..ControllerConfig::default()
    }
}

struct Harness {
    llm: Arc<MockLlmProvider>,
    researcher: Researcher,
}

fn harness(search: StaticSearchProvider, reader: StaticPageReader) -> Harness {
    harness_with(MockLlmProvider::new(), search, reader)
}

fn harness_with(llm: MockLlmProvider, search: StaticSearchProvider, reader: StaticPageReader) -> Harness {
    let llm = Arc::new(llm);
    let brain = Arc::new(Brain::new(llm.clone(), RetryConfig::none()));
    let researcher = Researcher::new(brain, Arc::new(search), Arc::new(reader))
        .with_controller_config(config())
        .with_retry(RetryConfig::none());
    Harness { llm, researcher }
}

fn default_harness() -> Harness {
    harness(StaticSearchProvider::new(), StaticPageReader::new())
}

fn answer_decision(text: &str, url: &str) -> serde_json::Value {
    json!({
        "action": "answer",
        "think": "I have enough to answer.",
        "answer": text,
        "references": [{"exactQuote": "Graydon Hoare", "url": url}],
    })
}

fn verdict(definitive: bool) -> serde_json::Value {
    json!({"is_definitive": definitive, "reasoning": "checked"})
}

fn progress_events(events: &[ProgressEvent]) -> Vec<&ProgressEvent> {
    events
        .iter()
        .filter(|e| e.kind == EventKind::Progress)
        .collect()
}

fn action_state(event: &ProgressEvent) -> &deepresearch_core::research::ActionState {
    match &event.data {
        EventData::Action(state) => state,
        other => panic!("expected action state, got {other:?}"),
    }
}

#[tokio::test]
async fn test_direct_answer_accepted() {
    let h = default_harness();
    h.llm.queue_json(answer_decision("Graydon Hoare.", RUST_URL));
    h.llm.queue_json(verdict(true));

    let sink = Arc::new(RecordingProgressSink::new());
    let answer = h
        .researcher
        .controller()
        .with_sink(sink.clone())
        .run(QUERY, 10_000, 3)
        .await
        .unwrap();

    assert_eq!(answer.status, ExitStatus::Answered);
    assert_eq!(answer.answer, "Graydon Hoare.");
    assert_eq!(answer.references.len(), 1);
    assert_eq!(answer.steps, 1);
    assert_eq!(answer.bad_attempts, 0);
    assert_eq!(answer.budget.breakdown.get(&CostCategory::Decision), Some(&150));
    assert_eq!(answer.budget.breakdown.get(&CostCategory::Evaluator), Some(&150));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::Progress);
    assert_eq!(events[1].kind, EventKind::Answer);
    assert!(events[1].is_terminal());
}

#[tokio::test]
async fn test_search_visit_answer() {
    let search = StaticSearchProvider::new().with_default(vec![SearchHit::new(
        "https://rust-lang.org",
        "Rust",
        "A language empowering everyone to build reliable software.",
    )]);
    let reader = StaticPageReader::new().with_page(RUST_URL, "Rust", PAGE_TEXT);
    let h = harness(search, reader);

    h.llm.queue_json(json!({
        "action": "search",
        "think": "Look up the language history.",
        "searchQuery": "rust language creator",
    }));
    h.llm.queue_json(json!({
        "action": "visit",
        "think": "Read the official site.",
        "URLTargets": ["https://rust-lang.org"],
    }));
    h.llm.queue_json(answer_decision("Graydon Hoare created Rust.", RUST_URL));
    h.llm.queue_json(verdict(true));

    let sink = Arc::new(RecordingProgressSink::new());
    let answer = h
        .researcher
        .controller()
        .with_sink(sink.clone())
        .run(QUERY, 100_000, 3)
        .await
        .unwrap();

    assert_eq!(answer.status, ExitStatus::Answered);
    assert_eq!(answer.steps, 3);
    assert!(answer.budget.breakdown.get(&CostCategory::Search).is_some());

    let events = sink.events();
    let progress = progress_events(&events);
    assert_eq!(progress.len(), 3);
    assert_eq!(action_state(progress[0]).action, Some(ActionKind::Search));
    assert_eq!(action_state(progress[1]).action, Some(ActionKind::Visit));
    assert_eq!(action_state(progress[2]).action, Some(ActionKind::Answer));
    assert!(!action_state(progress[1]).references.is_empty());
    // Budget never decreases across the stream.
    let used: Vec<u64> = events.iter().map(|e| e.budget.used).collect();
    assert!(used.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_repeated_rejection_goes_to_beast_mode() {
    let h = default_harness();
    h.llm.queue_json(answer_decision("Probably Mozilla.", RUST_URL));
    h.llm.queue_json(verdict(false));
    h.llm.queue_json(answer_decision("Maybe Mozilla.", RUST_URL));
    h.llm.queue_json(verdict(false));

    let sink = Arc::new(RecordingProgressSink::new());
    let answer = h
        .researcher
        .controller()
        .with_sink(sink.clone())
        .run(QUERY, 100_000, 2)
        .await
        .unwrap();

    assert_eq!(answer.status, ExitStatus::AnsweredUnverified);
    assert_eq!(answer.bad_attempts, 2);
    assert_eq!(answer.steps, 2);
    assert!(answer.answer.contains("Insufficient information"));

    let events = sink.events();
    let progress = progress_events(&events);
    assert_eq!(progress.len(), 2);
    assert!(action_state(progress[0]).rejection.is_some());
    assert_eq!(action_state(progress[1]).bad_attempts, 2);
    assert_eq!(events.last().map(|e| e.kind), Some(EventKind::Answer));
    // Nothing after the decision and evaluator calls: beast mode had an empty store.
    assert_eq!(h.llm.requests().len(), 4);
}

#[tokio::test]
async fn test_answer_without_references_is_rejected_without_evaluation() {
    let h = default_harness();
    h.llm.queue_json(json!({"action": "answer", "think": "guess", "answer": "Someone."}));

    let answer = h.researcher.controller().run(QUERY, 100_000, 1).await.unwrap();

    assert_eq!(answer.status, ExitStatus::AnsweredUnverified);
    assert_eq!(answer.bad_attempts, 1);
    assert_eq!(h.llm.requests().len(), 1);
}

#[tokio::test]
async fn test_budget_of_one_runs_a_single_step() {
    let h = default_harness();
    let sink = Arc::new(RecordingProgressSink::new());

    let answer = h
        .researcher
        .controller()
        .with_sink(sink.clone())
        .run(QUERY, 1, 3)
        .await
        .unwrap();

    assert_eq!(answer.status, ExitStatus::AnsweredUnverified);
    assert_eq!(answer.steps, 1);
    assert!(answer.budget.used >= 1);
    assert_eq!(progress_events(&sink.events()).len(), 1);
}

#[tokio::test]
async fn test_invalid_decision_disables_then_resets_mask() {
    let h = default_harness();
    h.llm.queue_text("I think we should look around a bit.");
    h.llm.queue_json(json!({
        "action": "reflect",
        "think": "Split the question.",
        "questionsToAnswer": ["When did Rust 1.0 ship?"],
    }));
    h.llm.queue_json(answer_decision("May 2015.", RUST_URL));
    h.llm.queue_json(answer_decision("Graydon Hoare.", RUST_URL));
    h.llm.queue_json(verdict(true));

    let sink = Arc::new(RecordingProgressSink::new());
    let answer = h
        .researcher
        .controller()
        .with_sink(sink.clone())
        .run(QUERY, 100_000, 3)
        .await
        .unwrap();
    assert_eq!(answer.status, ExitStatus::Answered);
    assert_eq!(answer.steps, 4);

    let events = sink.events();
    let progress = progress_events(&events);
    assert_eq!(progress.len(), 4);

    let first = action_state(progress[0]);
    assert_eq!(first.action, None);
    assert!(first.rejection.is_some());
    assert!(!first.errors.is_empty());

    let second = action_state(progress[1]);
    assert!(!second.availability.is_enabled(ActionKind::Search));
    assert!(second.availability.is_enabled(ActionKind::Answer));
    assert_eq!(second.question, QUERY);

    let third = action_state(progress[2]);
    assert!(third.availability.is_enabled(ActionKind::Search));
    assert_eq!(third.question, "When did Rust 1.0 ship?");

    let requests = h.llm.requests();
    assert!(requests[1].messages[1].content.contains("Not available this step: search."));
    assert!(!requests[2].messages[1].content.contains("Not available this step"));
}

#[tokio::test]
async fn test_search_failure_disables_search_for_next_step() {
    let search = StaticSearchProvider::new().with_failure(
        "rust creator",
        CollaboratorError::Unavailable {
            collaborator: "static-search".into(),
            message: "down".into(),
        },
    );
    let h = harness(search, StaticPageReader::new());
    h.llm.queue_json(json!({
        "action": "search",
        "think": "Search it.",
        "searchQuery": "rust creator",
    }));
    h.llm.queue_json(answer_decision("Graydon Hoare.", RUST_URL));
    h.llm.queue_json(verdict(true));

    let sink = Arc::new(RecordingProgressSink::new());
    let answer = h
        .researcher
        .controller()
        .with_sink(sink.clone())
        .run(QUERY, 100_000, 3)
        .await
        .unwrap();
    assert_eq!(answer.status, ExitStatus::Answered);

    let events = sink.events();
    let progress = progress_events(&events);
    assert!(!action_state(progress[0]).errors.is_empty());
    assert!(!action_state(progress[1]).availability.is_enabled(ActionKind::Search));
}

#[tokio::test]
async fn test_empty_search_disables_search_next_step() {
    let h = default_harness();
    h.llm.queue_json(json!({
        "action": "search",
        "think": "Search it.",
        "searchQuery": "rust creator",
    }));
    h.llm.queue_json(json!({
        "action": "search",
        "think": "Try again.",
        "searchQuery": "rust designer",
    }));
    h.llm.queue_json(answer_decision("Graydon Hoare.", RUST_URL));
    h.llm.queue_json(verdict(true));

    let sink = Arc::new(RecordingProgressSink::new());
    let answer = h
        .researcher
        .controller()
        .with_sink(sink.clone())
        .run(QUERY, 100_000, 3)
        .await
        .unwrap();
    assert_eq!(answer.status, ExitStatus::Answered);
    assert_eq!(answer.steps, 3);

    let events = sink.events();
    let progress = progress_events(&events);
    assert_eq!(progress.len(), 3);

    let first = action_state(progress[0]);
    assert_eq!(first.action, Some(ActionKind::Search));
    assert!(first.availability.is_enabled(ActionKind::Search));
    assert_eq!(first.summary, "search returned no new URLs");
    assert!(first.errors.is_empty());

    let second = action_state(progress[1]);
    assert!(!second.availability.is_enabled(ActionKind::Search));
    assert_eq!(second.action, None);
    assert_eq!(
        second.rejection.as_deref(),
        Some("action 'search' is not available this step")
    );

    assert_eq!(action_state(progress[2]).action, Some(ActionKind::Answer));
    // Two decisions, the final decision and its verdict; the rejected search never ran.
    assert_eq!(h.llm.requests().len(), 4);
    assert!(h.llm.requests()[1].messages[1].content.contains("Not available this step: search."));
}

#[tokio::test]
async fn test_budget_exhaustion_beast_mode_cites_store_reference() {
    const BOOK_URL: &str = "https://doc.rust-lang.org/book";
    const BOOK_TEXT: &str = "The Rust Programming Language book introduces ownership, borrowing and lifetimes. \
        It was written by Steve Klabnik and Carol Nichols with contributions from the Rust community.";
    let search = StaticSearchProvider::new().with_default(vec![
        SearchHit::new("https://rust-lang.org", "Rust", "A language empowering everyone."),
        SearchHit::new(BOOK_URL, "The Book", "Learn Rust from the official book."),
    ]);
    let reader = StaticPageReader::new()
        .with_page(RUST_URL, "Rust", PAGE_TEXT)
        .with_page(BOOK_URL, "The Book", BOOK_TEXT);

    // Once the script runs out every decision is malformed, so the run only
    // ends when the budget does; the same reply then serves beast mode.
    let beast = json!({
        "answer": "Graydon Hoare designed Rust.",
        "references": [{"exactQuote": "Graydon Hoare", "url": RUST_URL}],
    });
    let h = harness_with(MockLlmProvider::new().with_fallback(beast.to_string()), search, reader);
    h.llm.queue_json(json!({
        "action": "search",
        "think": "Find sources.",
        "searchQuery": "rust history",
    }));
    h.llm.queue_json(json!({
        "action": "visit",
        "think": "Read both.",
        "URLTargets": [RUST_URL, BOOK_URL],
    }));
    h.llm.queue_json(json!({
        "action": "reflect",
        "think": "Break it down.",
        "questionsToAnswer": ["When did Rust 1.0 ship?", "Who sponsored Rust?"],
    }));

    let sink = Arc::new(RecordingProgressSink::new());
    let answer = h
        .researcher
        .controller()
        .with_sink(sink.clone())
        .run(QUERY, 2_000, 3)
        .await
        .unwrap();

    assert_eq!(answer.status, ExitStatus::AnsweredUnverified);
    assert_eq!(answer.answer, "Graydon Hoare designed Rust.");
    assert_eq!(answer.bad_attempts, 0);
    assert!(answer.budget.used >= 2_000);
    assert_eq!(answer.budget.breakdown.get(&CostCategory::BeastMode), Some(&150));
    assert!(answer.references.iter().any(|r| r.url == RUST_URL));

    let events = sink.events();
    let progress = progress_events(&events);
    assert!(progress.len() > 3);
    assert_eq!(action_state(progress[0]).action, Some(ActionKind::Search));
    let visit = action_state(progress[1]);
    assert_eq!(visit.action, Some(ActionKind::Visit));
    assert_eq!(visit.references.len(), 2);
    assert_eq!(action_state(progress[2]).action, Some(ActionKind::Reflect));

    // Open sub-questions were still queued when the budget ran out.
    let last = action_state(progress[progress.len() - 1]);
    assert!(last.gaps.iter().any(|q| q == "When did Rust 1.0 ship?"));
    assert!(last.gaps.iter().any(|q| q == "Who sponsored Rust?"));

    // Beast mode saw the search snippets and both pages.
    let requests = h.llm.requests();
    let beast_prompt = &requests.last().unwrap().messages[1].content;
    assert!(beast_prompt.contains("Learn Rust from the official book."));
    assert!(beast_prompt.contains("Graydon Hoare at Mozilla"));
    assert!(beast_prompt.contains("Steve Klabnik"));
    assert_eq!(events.last().map(|e| e.kind), Some(EventKind::Answer));
}

#[tokio::test]
async fn test_zero_bad_attempts_is_rejected_before_any_step() {
    let h = default_harness();
    let sink = Arc::new(RecordingProgressSink::new());
    let result = h
        .researcher
        .controller()
        .with_sink(sink.clone())
        .run(QUERY, 100_000, 0)
        .await;
    assert!(matches!(
        result,
        Err(ResearchError::Controller(ControllerError::ZeroLimit { .. }))
    ));
    let result = h.researcher.controller().run(QUERY, 0, 3).await;
    assert!(matches!(
        result,
        Err(ResearchError::Controller(ControllerError::ZeroLimit { name: "budget" }))
    ));
    assert!(h.llm.requests().is_empty());
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Error);
}

#[tokio::test]
async fn test_cancelled_run_emits_error_event() {
    let h = default_harness();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let sink = Arc::new(RecordingProgressSink::new());

    let result = h
        .researcher
        .controller()
        .with_sink(sink.clone())
        .with_cancellation(cancel)
        .run(QUERY, 100_000, 3)
        .await;

    assert!(matches!(
        result,
        Err(ResearchError::Controller(ControllerError::Cancelled))
    ));
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Error);
    assert!(h.llm.requests().is_empty());
}

#[tokio::test]
async fn test_empty_query_is_rejected() {
    let h = default_harness();
    let sink = Arc::new(RecordingProgressSink::new());
    let result = h
        .researcher
        .controller()
        .with_sink(sink.clone())
        .run("   ", 100, 3)
        .await;
    assert!(matches!(
        result,
        Err(ResearchError::Controller(ControllerError::EmptyQuery))
    ));
    assert_eq!(sink.events().last().map(|e| e.kind), Some(EventKind::Error));
}

#[tokio::test]
async fn test_decision_model_outage_is_fatal() {
    let h = default_harness();
    h.llm.queue_error(deepresearch_core::LlmError::Connection {
        message: "refused".into(),
    });
    let sink = Arc::new(RecordingProgressSink::new());
    let result = h
        .researcher
        .controller()
        .with_sink(sink.clone())
        .run(QUERY, 100_000, 3)
        .await;
    assert!(matches!(result, Err(ResearchError::Llm(_))));
    assert_eq!(sink.events().last().map(|e| e.kind), Some(EventKind::Error));
}

#[tokio::test]
async fn test_isolated_runs_share_nothing() {
    let h = default_harness();
    h.llm.queue_json(answer_decision("Graydon Hoare.", RUST_URL));
    h.llm.queue_json(verdict(true));
    h.llm.queue_json(answer_decision("Graydon Hoare.", RUST_URL));
    h.llm.queue_json(verdict(true));

    let first = h.researcher.controller().run(QUERY, 10_000, 3).await.unwrap();
    let second = h.researcher.controller().run(QUERY, 10_000, 3).await.unwrap();
    assert_eq!(first.steps, 1);
    assert_eq!(second.steps, 1);
    assert_eq!(first.budget.used, second.budget.used);
}
