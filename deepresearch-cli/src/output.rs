//! Terminal rendering of progress events and final answers.

use deepresearch_core::research::{EventData, FinalAnswer, ProgressEvent};

const THINK_PREVIEW_CHARS: usize = 100;

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

/// One line per event: step, budget usage, action, and what happened.
pub fn format_event(event: &ProgressEvent) -> String {
    let budget = format!(
        "[step {} | {}/{} ({:.1}%)]",
        event.step, event.budget.used, event.budget.total, event.budget.percentage
    );
    match &event.data {
        EventData::Action(state) => {
            let action = state.action.map(|a| a.as_str()).unwrap_or("rejected");
            let mut line = format!("{budget} {action}: {}", state.summary);
            if let Some(reason) = &state.rejection {
                line.push_str(&format!(" (rejected: {reason})"));
            }
            if !state.think.is_empty() {
                line.push_str(&format!("\n    {}", preview(&state.think, THINK_PREVIEW_CHARS)));
            }
            line
        }
        EventData::Answer(answer) => format!("{budget} done: {}", answer.status.as_str()),
        EventData::Error { message } => format!("{budget} error: {message}"),
    }
}

/// The answer followed by a numbered reference list.
pub fn format_answer(answer: &FinalAnswer) -> String {
    let mut out = answer.answer.trim().to_string();
    if !answer.references.is_empty() {
        out.push_str("\n\nReferences:");
        for (i, reference) in answer.references.iter().enumerate() {
            out.push_str(&format!("\n  [{}] {}", i + 1, reference.url));
            if !reference.snippet.is_empty() {
                out.push_str(&format!("\n      \"{}\"", preview(&reference.snippet, 160)));
            }
        }
    }
    out
}
