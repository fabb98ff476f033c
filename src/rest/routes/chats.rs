// rest/routes/chats.rs: chat history reads.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use crate::error::ApiError;
use crate::rest::auth;
use crate::AppContext;

pub async fn list_chats(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let uid = auth::require_user(&ctx, &headers)?;
    let chats = ctx.storage.list_chats(&uid).await.map_err(|e| {
        error!(err = %e, user = %uid, "could not list chats");
        ApiError::internal("An internal error occurred.")
    })?;
    let list: Vec<Value> = chats
        .iter()
        .map(|c| json!({ "id": c.id, "startTime": c.start_time }))
        .collect();
    Ok(Json(json!({ "chats": list })))
}

pub async fn list_messages(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let uid = auth::require_user(&ctx, &headers)?;

    // Ownership check; another user's chat reads as absent.
    ctx.storage
        .get_chat(&uid, &chat_id)
        .await
        .map_err(|e| {
            error!(err = %e, chat_id = %chat_id, "could not fetch chat");
            ApiError::internal("An internal error occurred.")
        })?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;

    let messages = ctx.storage.list_messages(&chat_id).await.map_err(|e| {
        error!(err = %e, chat_id = %chat_id, "could not list messages");
        ApiError::internal("An internal error occurred.")
    })?;
    let list: Vec<Value> = messages
        .iter()
        .map(|m| {
            json!({
                "id": m.id,
                "sender": m.sender,
                "text": m.text,
                "sources": serde_json::from_str::<Value>(&m.sources).unwrap_or_else(|_| json!([])),
                "feedbackRating": m.feedback_rating,
                "createdAt": m.created_at,
            })
        })
        .collect();
    Ok(Json(json!({ "chatId": chat_id, "messages": list })))
}
