//! Flow engine: delegates model inference to named flows.
//!
//! A flow takes a JSON input and produces a JSON output. The daemon never
//! talks to a model directly; it invokes flows through the `FlowRunner`
//! seam, either against a remote Genkit-style service (`GenkitClient`) or
//! the built-in `SimulatedRunner` when no service is configured.

pub mod genkit;
pub mod simulated;

pub use genkit::GenkitClient;
pub use simulated::SimulatedRunner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The flows this daemon invokes. Registered at compile time; an id outside
/// this set cannot be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowId {
    /// Conversational turn with retrieval-augmented context.
    Rag,
    /// Multiple-choice quiz generation.
    Quiz,
}

impl FlowId {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowId::Rag => "rag",
            FlowId::Quiz => "quiz",
        }
    }
}

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("flow service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to encode flow input: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("flow `{flow}` returned invalid data: {reason}")]
    InvalidOutput { flow: &'static str, reason: String },
}

impl FlowError {
    fn invalid(flow: FlowId, reason: impl Into<String>) -> Self {
        Self::InvalidOutput {
            flow: flow.as_str(),
            reason: reason.into(),
        }
    }
}

/// Seam between the daemon and model inference.
#[async_trait]
pub trait FlowRunner: Send + Sync {
    async fn run(&self, flow: FlowId, input: Value) -> Result<Value, FlowError>;
}

// ─── Wire types (camelCase, matching the flow service contract) ───────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentMessage {
    pub sender: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagInput {
    pub user_id: String,
    pub message: String,
    pub context_summary: String,
    pub recent_messages: Vec<RecentMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagOutput {
    pub text: String,
    pub sources: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizInput {
    pub user_id: String,
    pub num_questions: usize,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub choices: Vec<String>,
    pub correct_answer: usize,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOutput {
    pub questions: Vec<QuizQuestion>,
}

// ─── Typed invocation + output validation ─────────────────────────────────────

/// Run the RAG flow and validate its output shape.
pub async fn run_rag(runner: &dyn FlowRunner, input: &RagInput) -> Result<RagOutput, FlowError> {
    let raw = runner.run(FlowId::Rag, serde_json::to_value(input)?).await?;
    let out: RagOutput = serde_json::from_value(raw)
        .map_err(|e| FlowError::invalid(FlowId::Rag, e.to_string()))?;
    Ok(out)
}

/// Run the quiz flow and validate its output shape: a non-empty question
/// list where every answer index points at an existing choice.
pub async fn run_quiz(runner: &dyn FlowRunner, input: &QuizInput) -> Result<QuizOutput, FlowError> {
    let raw = runner.run(FlowId::Quiz, serde_json::to_value(input)?).await?;
    let out: QuizOutput = serde_json::from_value(raw)
        .map_err(|e| FlowError::invalid(FlowId::Quiz, e.to_string()))?;

    if out.questions.is_empty() {
        return Err(FlowError::invalid(FlowId::Quiz, "empty question list"));
    }
    for (i, q) in out.questions.iter().enumerate() {
        if q.choices.len() < 2 {
            return Err(FlowError::invalid(
                FlowId::Quiz,
                format!("question {i} has fewer than 2 choices"),
            ));
        }
        if q.correct_answer >= q.choices.len() {
            return Err(FlowError::invalid(
                FlowId::Quiz,
                format!(
                    "question {i}: correctAnswer {} out of range for {} choices",
                    q.correct_answer,
                    q.choices.len()
                ),
            ));
        }
    }
    if out.questions.len() != input.num_questions {
        tracing::warn!(
            requested = input.num_questions,
            returned = out.questions.len(),
            "quiz flow returned a different question count than requested"
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Canned(Value);

    #[async_trait]
    impl FlowRunner for Canned {
        async fn run(&self, _flow: FlowId, _input: Value) -> Result<Value, FlowError> {
            Ok(self.0.clone())
        }
    }

    fn quiz_input(n: usize) -> QuizInput {
        QuizInput {
            user_id: "u1".into(),
            num_questions: n,
            topics: vec!["Weather".into()],
        }
    }

    #[tokio::test]
    async fn rag_output_missing_sources_is_invalid() {
        let runner = Canned(json!({ "text": "hello" }));
        let input = RagInput {
            user_id: "u1".into(),
            message: "hi".into(),
            context_summary: String::new(),
            recent_messages: vec![],
        };
        let err = run_rag(&runner, &input).await.unwrap_err();
        assert!(matches!(err, FlowError::InvalidOutput { flow: "rag", .. }));
    }

    #[tokio::test]
    async fn quiz_answer_index_out_of_range_is_invalid() {
        let runner = Canned(json!({
            "questions": [{
                "question": "Q?",
                "choices": ["A", "B"],
                "correctAnswer": 2,
                "explanation": "E"
            }]
        }));
        let err = run_quiz(&runner, &quiz_input(1)).await.unwrap_err();
        assert!(matches!(err, FlowError::InvalidOutput { flow: "quiz", .. }));
    }

    #[tokio::test]
    async fn quiz_empty_question_list_is_invalid() {
        let runner = Canned(json!({ "questions": [] }));
        let err = run_quiz(&runner, &quiz_input(1)).await.unwrap_err();
        assert!(matches!(err, FlowError::InvalidOutput { .. }));
    }

    #[tokio::test]
    async fn valid_quiz_output_passes() {
        let runner = Canned(json!({
            "questions": [{
                "question": "Q?",
                "choices": ["A", "B", "C", "D"],
                "correctAnswer": 1,
                "explanation": "E"
            }]
        }));
        let out = run_quiz(&runner, &quiz_input(1)).await.unwrap();
        assert_eq!(out.questions.len(), 1);
        assert_eq!(out.questions[0].correct_answer, 1);
    }
}
