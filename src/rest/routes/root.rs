use axum::Json;
use serde_json::{json, Value};

/// Title of the root container.
pub const APP_TITLE: &str = "AviatorAI App";
/// Fixed greeting shown by the root container.
pub const GREETING: &str = "Hello Firebase!";

pub async fn root() -> Json<Value> {
    Json(json!({
        "title": APP_TITLE,
        "message": GREETING,
    }))
}
