// rest/routes/quiz.rs: quiz generation from the caller's weak topics.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::flows::{self, QuizInput};
use crate::rest::{auth, extract::ApiJson};
use crate::AppContext;

const DEFAULT_NUM_QUESTIONS: usize = 5;
const MAX_NUM_QUESTIONS: usize = 20;

/// Fallback topics when the caller has no recorded weak topics yet.
pub const DEFAULT_TOPICS: [&str; 6] = [
    "Airspace",
    "Weather",
    "Aircraft Performance",
    "Federal Aviation Regulations",
    "Navigation",
    "Aeromedical Factors",
];

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuizRequest {
    pub num_questions: Option<usize>,
}

pub async fn generate_quiz(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: Option<ApiJson<QuizRequest>>,
) -> Result<Json<Value>, ApiError> {
    let uid = auth::require_user(&ctx, &headers)?;

    // An absent body means all defaults.
    let body = body.map(|ApiJson(b)| b).unwrap_or_default();
    let num_questions = body.num_questions.unwrap_or(DEFAULT_NUM_QUESTIONS);
    if num_questions < 1 || num_questions > MAX_NUM_QUESTIONS {
        return Err(ApiError::invalid(format!(
            "Parameter \"numQuestions\" must be between 1 and {MAX_NUM_QUESTIONS}."
        )));
    }

    // Weak-topic lookup is best-effort; the built-in list covers the rest.
    let topics = match ctx.storage.get_weak_topics(&uid).await {
        Ok(Some(topics)) => {
            info!(user = %uid, ?topics, "using stored weak topics");
            topics
        }
        Ok(None) => DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
        Err(e) => {
            warn!(err = %e, user = %uid, "could not fetch weak topics, using defaults");
            DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect()
        }
    };

    let input = QuizInput {
        user_id: uid.clone(),
        num_questions,
        topics: topics.clone(),
    };
    let output = flows::run_quiz(ctx.flows.as_ref(), &input)
        .await
        .map_err(|e| {
            error!(err = %e, user = %uid, "quiz flow failed");
            ApiError::internal("Failed to generate quiz questions.")
        })?;

    let questions_json = serde_json::to_string(&output.questions).map_err(|e| {
        error!(err = %e, "could not encode quiz questions");
        ApiError::internal("An internal error occurred while generating the quiz.")
    })?;
    let quiz = ctx
        .storage
        .insert_quiz(&uid, &questions_json, &topics)
        .await
        .map_err(|e| {
            error!(err = %e, user = %uid, "could not persist quiz");
            ApiError::internal("An internal error occurred while generating the quiz.")
        })?;
    info!(quiz_id = %quiz.id, user = %uid, questions = output.questions.len(), "quiz persisted");

    Ok(Json(json!({
        "quizId": quiz.id,
        "questions": output.questions,
    })))
}
