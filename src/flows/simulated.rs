//! Built-in flow runner serving canned responses.
//!
//! Active when no flow service is configured. Useful for local development
//! and tests; every invocation logs a warning so simulated output is never
//! mistaken for real inference.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use super::{FlowError, FlowId, FlowRunner};

#[derive(Debug, Default)]
pub struct SimulatedRunner;

impl SimulatedRunner {
    pub fn new() -> Self {
        Self
    }

    fn rag(input: &Value) -> Value {
        let message = input
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("...");
        json!({
            "text": format!("Simulated response to '{message}'."),
            "sources": [
                { "docId": "sim_doc_1", "chunkId": "sim_chunk_a",
                  "metadata": { "title": "Simulated Source 1" } },
                { "docId": "sim_doc_2", "chunkId": "sim_chunk_b",
                  "metadata": { "title": "Simulated Source 2" } },
            ],
        })
    }

    fn quiz(input: &Value) -> Value {
        let num = input
            .get("numQuestions")
            .and_then(Value::as_u64)
            .unwrap_or(2) as usize;
        let topics: Vec<&str> = input
            .get("topics")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let questions: Vec<Value> = (0..num)
            .map(|i| {
                let topic = topics.get(i % topics.len().max(1)).copied().unwrap_or("general");
                json!({
                    "question": format!("Simulated question {} about {topic}?", i + 1),
                    "choices": ["A", "B", "C", "D"],
                    "correctAnswer": i % 4,
                    "explanation": format!("Simulated explanation for question {}.", i + 1),
                })
            })
            .collect();
        json!({ "questions": questions })
    }
}

#[async_trait]
impl FlowRunner for SimulatedRunner {
    async fn run(&self, flow: FlowId, input: Value) -> Result<Value, FlowError> {
        warn!(flow = %flow, "no flow service configured; returning simulated output");
        Ok(match flow {
            FlowId::Rag => Self::rag(&input),
            FlowId::Quiz => Self::quiz(&input),
        })
    }
}
