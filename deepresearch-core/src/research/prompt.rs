//! Prompt text for every model role.
//!
//! System prompts are fixed; user prompts are rendered from the current
//! state so the model sees the question, what is known, and what is allowed.

use super::decision::DecisionContext;
use super::knowledge::{KnowledgeItem, Reference};
use super::state::DiaryEntry;
use crate::types::ActionKind;
use std::fmt::Write;

pub const DECISION_SYSTEM: &str = "You are a deep research assistant. You work step by step: \
at each step you pick exactly one action that moves you closer to a definitive, well-referenced \
answer to the user's question. Reply with a single JSON object and nothing else.";

pub const EVALUATOR_SYSTEM: &str = "You are an evaluator of answer definitiveness. Analyze if the \
given answer provides a definitive response or not.\n\n\
Core evaluation criterion:\n\
- Definitiveness: \"I don't know\", \"lack of information\", \"doesn't exist\", \"not sure\" or \
highly uncertain/ambiguous responses are not definitive and must return false.\n\n\
Reply with a JSON object: {\"is_definitive\": boolean, \"reasoning\": string}.";

pub const QUERY_REWRITER_SYSTEM: &str = "You are an expert information retrieval assistant. \
Transform the query into one to three precise keyword queries, orthogonal to each other.\n\n\
Rules:\n\
1. Keep base keywords minimal: 2-3 words preferred.\n\
2. Use exact match quotes for phrases that must stay together.\n\
3. Split queries only for distinctly different aspects.\n\
4. Operators (\"phrase\", +term, -term, site:, filetype:, lang:, intitle:) go at the end, never alone.\n\n\
Reply with a JSON object: {\"think\": string, \"queries\": [string]}.";

pub const DEDUP_SYSTEM: &str = "You are an expert in semantic similarity analysis. Given candidate \
questions (setA) and existing questions (setB), keep each candidate only if its similarity to every \
accepted candidate and every member of setB is below 0.2. Consider intent, not wording: different \
phrasings of the same need are duplicates; different aspects of a topic are not.\n\n\
Reply with a JSON object: {\"think\": string, \"unique_questions\": [string]}.";

pub const ERROR_ANALYZER_SYSTEM: &str = "You analyze a research trajectory whose final answer was \
rejected. Summarize what happened, identify the step that caused the failure, and propose a concrete \
improvement for the next attempt.\n\n\
Reply with a JSON object: {\"recap\": string, \"blame\": string, \"improvement\": string}.";

pub const BEAST_MODE_SYSTEM: &str = "You are out of research budget. Using only the knowledge \
provided, write the best possible answer to the question now. Be decisive, cite the URLs you rely \
on, and never refuse.\n\n\
Reply with a JSON object: {\"answer\": string, \"references\": [{\"exactQuote\": string, \"url\": string}]}.";

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn action_schema(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Search => {
            "- search: look something up on the web.\n  {\"action\": \"search\", \"think\": \"...\", \"searchQuery\": \"...\"}"
        }
        ActionKind::Visit => {
            "- visit: read the full text of URLs from the known URL list.\n  {\"action\": \"visit\", \"think\": \"...\", \"URLTargets\": [\"https://...\"]}"
        }
        ActionKind::Reflect => {
            "- reflect: identify missing sub-questions that must be answered first.\n  {\"action\": \"reflect\", \"think\": \"...\", \"questionsToAnswer\": [\"...\"]}"
        }
        ActionKind::Answer => {
            "- answer: give a definitive answer backed by references.\n  {\"action\": \"answer\", \"think\": \"...\", \"answer\": \"...\", \"references\": [{\"exactQuote\": \"...\", \"url\": \"...\"}]}"
        }
    }
}

fn write_knowledge(out: &mut String, items: &[KnowledgeItem]) {
    if items.is_empty() {
        out.push_str("<knowledge>\n(none yet)\n</knowledge>\n\n");
        return;
    }
    out.push_str("<knowledge>\n");
    for (i, item) in items.iter().enumerate() {
        let _ = writeln!(out, "[{}] Q: {}", i + 1, item.question);
        let _ = writeln!(out, "    A: {}", item.answer);
        for r in &item.references {
            let _ = writeln!(out, "    ref: {}", r.url);
        }
    }
    out.push_str("</knowledge>\n\n");
}

fn write_diary(out: &mut String, diary: &[&DiaryEntry]) {
    if diary.is_empty() {
        return;
    }
    out.push_str("<diary>\n");
    for entry in diary {
        let action = entry.action.map(|a| a.as_str()).unwrap_or("none");
        let _ = writeln!(
            out,
            "step {} [{}] on \"{}\": {} => {}",
            entry.step, action, entry.question, entry.think, entry.summary
        );
    }
    out.push_str("</diary>\n\n");
}

/// The per-step decision prompt.
pub fn decision_prompt(ctx: &DecisionContext<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Step {}.\n", ctx.step);
    let _ = writeln!(out, "Original question: {}", ctx.query);
    if ctx.question.is_original() {
        out.push_str("You are now working on the original question.\n\n");
    } else {
        let _ = writeln!(
            out,
            "You are now working on the sub-question: {}\n",
            ctx.question.text()
        );
    }

    write_knowledge(&mut out, ctx.knowledge);

    if !ctx.frontier.is_empty() {
        out.push_str("<urls>\n");
        for entry in &ctx.frontier {
            let _ = writeln!(out, "- {} {}", entry.url, entry.title);
        }
        out.push_str("</urls>\n\n");
    }

    if !ctx.open_gaps.is_empty() {
        out.push_str("<open-questions>\n");
        for q in &ctx.open_gaps {
            let _ = writeln!(out, "- {q}");
        }
        out.push_str("</open-questions>\n\n");
    }

    write_diary(&mut out, &ctx.diary);

    if !ctx.lessons.is_empty() {
        let _ = writeln!(
            out,
            "<bad-attempts count=\"{}\">",
            ctx.bad_attempts
        );
        for lesson in ctx.lessons {
            let _ = writeln!(out, "Rejected answer: {}", lesson.answer);
            let _ = writeln!(out, "Why: {}", lesson.rejection);
            if !lesson.improvement.is_empty() {
                let _ = writeln!(out, "Improve: {}", lesson.improvement);
            }
        }
        out.push_str("</bad-attempts>\n\n");
    }

    out.push_str("Choose exactly one of these actions:\n");
    for kind in ctx.availability.enabled() {
        out.push_str(action_schema(kind));
        out.push('\n');
    }
    let disabled = ctx.availability.disabled();
    if !disabled.is_empty() {
        let names: Vec<&str> = disabled.iter().map(|k| k.as_str()).collect();
        let _ = writeln!(out, "\nNot available this step: {}.", names.join(", "));
    }
    out
}

pub fn evaluator_prompt(question: &str, answer: &str) -> String {
    format!("Now evaluate this pair:\nQuestion: {question}\nAnswer: {answer}")
}

pub fn query_rewriter_prompt(query: &str, intention: &str) -> String {
    format!("Input query: {query}\nIntention: {intention}")
}

pub fn dedup_prompt(candidates: &[String], existing: &[String]) -> String {
    let set_a = serde_json::to_string(candidates).unwrap_or_default();
    let set_b = serde_json::to_string(existing).unwrap_or_default();
    format!("SetA: {set_a}\nSetB: {set_b}")
}

pub fn error_analyzer_prompt(
    question: &str,
    diary: &[&DiaryEntry],
    answer: &str,
    rejection: &str,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Question: {question}\n");
    write_diary(&mut out, diary);
    let _ = writeln!(out, "Final answer: {answer}");
    let _ = writeln!(out, "Rejected because: {rejection}");
    out
}

pub fn beast_mode_prompt(query: &str, items: &[KnowledgeItem], references: &[Reference]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Question: {query}\n");
    write_knowledge(&mut out, items);
    if !references.is_empty() {
        out.push_str("<sources>\n");
        for r in references {
            let _ = writeln!(out, "- {}: {}", r.url, r.snippet);
        }
        out.push_str("</sources>\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::availability::ActionAvailability;
    use crate::research::gaps::GapEntry;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello...");
        assert_eq!(truncate_chars("héllo", 2), "hé...");
    }

    #[test]
    fn test_decision_prompt_lists_only_enabled_actions() {
        let question = GapEntry::Original("What is Rust?".into());
        let ctx = DecisionContext {
            step: 3,
            query: "What is Rust?",
            question: &question,
            knowledge: &[],
            frontier: vec![],
            open_gaps: vec![],
            diary: vec![],
            lessons: &[],
            availability: ActionAvailability::for_step(&[ActionKind::Search]),
            bad_attempts: 0,
        };
        let prompt = decision_prompt(&ctx);
        assert!(prompt.contains("Step 3."));
        assert!(prompt.contains("original question"));
        assert!(!prompt.contains("\"action\": \"search\""));
        assert!(prompt.contains("\"action\": \"answer\""));
        assert!(prompt.contains("Not available this step: search."));
    }

    #[test]
    fn test_dedup_prompt_is_json_lists() {
        let prompt = dedup_prompt(&["a".into()], &["b".into(), "c".into()]);
        assert!(prompt.contains(r#"SetA: ["a"]"#));
        assert!(prompt.contains(r#"SetB: ["b","c"]"#));
    }
}
