//! Post-mortem of a rejected answer, kept as a lesson for later decisions.

use super::prompt;
use super::state::{DiaryEntry, Lesson};
use crate::brain::{Brain, ModelRole, parse_json_reply};
use crate::error::LlmError;
use crate::types::TokenUsage;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct AnalysisReply {
    #[serde(default)]
    recap: String,
    #[serde(default)]
    blame: String,
    #[serde(default)]
    improvement: String,
}

pub struct ErrorAnalyzer {
    brain: Arc<Brain>,
}

impl ErrorAnalyzer {
    pub fn new(brain: Arc<Brain>) -> Self {
        Self { brain }
    }

    pub async fn analyze(
        &self,
        question: &str,
        diary: &[&DiaryEntry],
        answer: &str,
        rejection: &str,
    ) -> Result<(Lesson, TokenUsage), LlmError> {
        let reply = self
            .brain
            .complete(
                ModelRole::ErrorAnalyzer,
                prompt::ERROR_ANALYZER_SYSTEM,
                &prompt::error_analyzer_prompt(question, diary, answer, rejection),
            )
            .await?;

        let parsed: AnalysisReply =
            parse_json_reply(&reply.text).map_err(|e| LlmError::ResponseParse {
                message: format!("error analyzer: {e}"),
            })?;

        Ok((
            Lesson {
                answer: answer.to_string(),
                rejection: rejection.to_string(),
                recap: parsed.recap,
                blame: parsed.blame,
                improvement: parsed.improvement,
            },
            reply.usage,
        ))
    }
}

/// A lesson with no analysis, used when the analyzer is off or fails.
pub fn bare_lesson(answer: &str, rejection: &str) -> Lesson {
    Lesson {
        answer: answer.to_string(),
        rejection: rejection.to_string(),
        recap: String::new(),
        blame: String::new(),
        improvement: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::config::RetryConfig;
    use crate::types::ActionKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_analyze_builds_lesson() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_json(json!({
            "recap": "searched once then answered",
            "blame": "answered without reading sources",
            "improvement": "visit the top result first"
        }));
        let analyzer = ErrorAnalyzer::new(Arc::new(Brain::new(provider.clone(), RetryConfig::none())));
        let entry = DiaryEntry {
            step: 1,
            question: "Q".into(),
            action: Some(ActionKind::Search),
            think: "t".into(),
            summary: "s".into(),
        };
        let (lesson, usage) = analyzer
            .analyze("Q", &[&entry], "maybe", "not definitive")
            .await
            .unwrap();
        assert_eq!(lesson.improvement, "visit the top result first");
        assert_eq!(lesson.rejection, "not definitive");
        assert_eq!(usage.total(), 150);
        let prompt = &provider.requests()[0].messages[1].content;
        assert!(prompt.contains("step 1 [search]"));
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_error() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_text("no idea");
        let analyzer = ErrorAnalyzer::new(Arc::new(Brain::new(provider, RetryConfig::none())));
        let err = analyzer.analyze("Q", &[], "a", "r").await.unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
    }

    #[test]
    fn test_bare_lesson() {
        let lesson = bare_lesson("a", "r");
        assert!(lesson.recap.is_empty());
        assert_eq!(lesson.answer, "a");
    }
}
