// rest/routes/feedback.rs: feedback submission.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::ApiError;
use crate::rest::{auth, extract::ApiJson};
use crate::AppContext;

const VALID_KINDS: [&str; 3] = ["chat", "quiz", "general"];
const VALID_RATINGS: [i64; 3] = [-1, 0, 1];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub related_id: Option<String>,
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
    /// Required for chat feedback so the message's rating can be updated.
    pub chat_id: Option<String>,
}

pub async fn submit_feedback(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<FeedbackRequest>,
) -> Result<Json<Value>, ApiError> {
    let uid = auth::require_user(&ctx, &headers)?;

    if !VALID_KINDS.contains(&body.kind.as_str()) {
        return Err(ApiError::invalid(format!(
            "Invalid feedback type \"{}\". Must be one of: chat, quiz, general.",
            body.kind
        )));
    }
    let related_id = body.related_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if body.kind != "general" && related_id.is_none() {
        return Err(ApiError::invalid(format!(
            "Missing \"relatedId\" for feedback type \"{}\".",
            body.kind
        )));
    }
    if !VALID_RATINGS.contains(&body.rating) {
        return Err(ApiError::invalid(
            "Invalid \"rating\". Must be one of: -1, 0, 1.",
        ));
    }

    // Master feedback record. General feedback never carries a related id.
    let related_for_record = if body.kind == "general" { None } else { related_id };
    let record = ctx
        .storage
        .insert_feedback(
            &uid,
            &body.kind,
            related_for_record,
            body.chat_id.as_deref(),
            body.rating,
            &body.comment,
        )
        .await
        .map_err(|e| {
            error!(err = %e, user = %uid, "could not persist feedback");
            ApiError::internal("An internal error occurred while submitting feedback.")
        })?;
    info!(feedback_id = %record.id, kind = %body.kind, rating = body.rating, "feedback stored");

    // Chat feedback additionally updates the message's rating. The master
    // record is already persisted, so problems here are logged, not fatal.
    if body.kind == "chat" {
        let message_id = related_id.unwrap_or_default();
        match body.chat_id.as_deref() {
            None => {
                error!(
                    message_id = %message_id,
                    "chat feedback without \"chatId\"; cannot update message rating"
                );
            }
            Some(chat_id) => {
                match ctx
                    .storage
                    .set_message_feedback(chat_id, message_id, body.rating)
                    .await
                {
                    Ok(true) => {
                        info!(chat_id = %chat_id, message_id = %message_id, rating = body.rating,
                              "message feedback rating updated");
                    }
                    Ok(false) => {
                        error!(chat_id = %chat_id, message_id = %message_id,
                               "chat message not found; feedback rating not updated");
                    }
                    Err(e) => {
                        error!(err = %e, message_id = %message_id,
                               "failed to update message feedback rating");
                    }
                }
            }
        }
    }

    Ok(Json(json!({ "success": true })))
}
