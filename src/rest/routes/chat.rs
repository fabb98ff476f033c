// rest/routes/chat.rs: one conversational turn with RAG context.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::flows::{self, RagInput, RecentMessage};
use crate::rest::{auth, extract::ApiJson};
use crate::AppContext;

/// How many recent messages are sent to the RAG flow as history.
const HISTORY_LIMIT: i64 = 5;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub chat_id: Option<String>,
}

pub async fn chat(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let uid = auth::require_user(&ctx, &headers)?;

    let message = body.message.trim();
    if message.is_empty() {
        return Err(ApiError::invalid(
            "The request must include a non-empty \"message\".",
        ));
    }

    // Create or look up the chat. A supplied id must reference one of the
    // caller's own chats.
    let chat = match &body.chat_id {
        Some(id) => ctx
            .storage
            .get_chat(&uid, id)
            .await
            .map_err(|e| storage_failure(&e))?
            .ok_or_else(|| ApiError::not_found("Chat not found"))?,
        None => {
            let chat = ctx
                .storage
                .create_chat(&uid)
                .await
                .map_err(|e| storage_failure(&e))?;
            info!(chat_id = %chat.id, user = %uid, "created new chat");
            chat
        }
    };

    ctx.storage
        .insert_message(&chat.id, "user", message, "[]")
        .await
        .map_err(|e| storage_failure(&e))?;

    // Context gathering is best-effort: a missing summary or failed history
    // read degrades the prompt, it does not fail the turn.
    let context_summary = match ctx.storage.get_context_summary(&uid).await {
        Ok(summary) => summary.unwrap_or_default(),
        Err(e) => {
            warn!(err = %e, user = %uid, "could not fetch context summary");
            String::new()
        }
    };
    let recent_messages = match ctx.storage.recent_messages(&chat.id, HISTORY_LIMIT).await {
        Ok(rows) => rows
            .into_iter()
            .map(|m| RecentMessage {
                sender: m.sender,
                text: m.text,
            })
            .collect(),
        Err(e) => {
            warn!(err = %e, chat_id = %chat.id, "could not fetch recent messages");
            Vec::new()
        }
    };

    let input = RagInput {
        user_id: uid.clone(),
        message: message.to_string(),
        context_summary,
        recent_messages,
    };
    let output = flows::run_rag(ctx.flows.as_ref(), &input)
        .await
        .map_err(|e| {
            error!(err = %e, chat_id = %chat.id, "RAG flow failed");
            ApiError::internal("Failed to get response from AI model.")
        })?;

    let sources_json =
        serde_json::to_string(&output.sources).map_err(|e| storage_failure(&e.into()))?;
    let ai_message = ctx
        .storage
        .insert_message(&chat.id, "ai", &output.text, &sources_json)
        .await
        .map_err(|e| storage_failure(&e))?;

    Ok(Json(json!({
        "chatId": chat.id,
        "messageId": ai_message.id,
        "responseText": output.text,
        "sources": output.sources,
    })))
}

fn storage_failure(e: &anyhow::Error) -> ApiError {
    error!(err = %e, "chat turn failed");
    ApiError::internal("An internal error occurred processing your message.")
}
