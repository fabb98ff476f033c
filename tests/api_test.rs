//! Integration tests for the aviatord HTTP API.
//! Boots a real daemon on a free port (simulated flow runner) and exercises
//! the callable operations end to end.

use aviatord::bootstrap::Sequencer;
use aviatord::config::AppConfig;
use aviatord::AppContext;
use serde_json::{json, Value};
use std::sync::Arc;

const API_TOKEN: &str = "test-token";
const USER: &str = "user-1";

/// Start a daemon on a random port and return its base URL + context.
async fn start_test_daemon() -> (String, Arc<AppContext>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let port = get_free_port();

    let mut config = AppConfig::new(
        Some(port),
        Some(dir.path().to_path_buf()),
        Some("warn".to_string()),
        None,
    );
    config.api_token = Some(API_TOKEN.to_string());
    config.flow_base_url = None; // simulated flows

    let (sequencer, _phase) = Sequencer::new(Arc::new(config));
    let ready = sequencer
        .bind_runtime()
        .unwrap()
        .init_backend()
        .await
        .unwrap();
    let ctx = ready.context();
    tokio::spawn(ready.hand_off());

    // Give the server a moment to bind
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), ctx, dir)
}

fn get_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

async fn post(base: &str, path: &str, body: Value) -> (reqwest::StatusCode, Value) {
    let resp = client()
        .post(format!("{base}{path}"))
        .bearer_auth(API_TOKEN)
        .header("x-user-id", USER)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    let body = resp.json().await.unwrap_or_default();
    (status, body)
}

async fn get(base: &str, path: &str) -> (reqwest::StatusCode, Value) {
    let resp = client()
        .get(format!("{base}{path}"))
        .bearer_auth(API_TOKEN)
        .header("x-user-id", USER)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    let body = resp.json().await.unwrap_or_default();
    (status, body)
}

// ─── Chat ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_turn_end_to_end() {
    let (base, _ctx, _dir) = start_test_daemon().await;

    let (status, body) = post(&base, "/api/v1/chat", json!({ "message": "What is VFR?" })).await;
    assert_eq!(status, 200);
    let chat_id = body["chatId"].as_str().unwrap().to_string();
    assert!(!chat_id.is_empty());
    assert!(body["responseText"].as_str().unwrap().contains("What is VFR?"));
    assert_eq!(body["sources"].as_array().unwrap().len(), 2);

    // Second turn in the same chat.
    let (status, body2) = post(
        &base,
        "/api/v1/chat",
        json!({ "message": "And IFR?", "chatId": chat_id }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body2["chatId"], chat_id.as_str());

    // History: one chat, four messages (user/ai per turn), in order.
    let (status, chats) = get(&base, "/api/v1/chats").await;
    assert_eq!(status, 200);
    assert_eq!(chats["chats"].as_array().unwrap().len(), 1);

    let (status, messages) = get(&base, &format!("/api/v1/chats/{chat_id}/messages")).await;
    assert_eq!(status, 200);
    let messages = messages["messages"].as_array().unwrap().clone();
    assert_eq!(messages.len(), 4);
    let senders: Vec<_> = messages.iter().map(|m| m["sender"].as_str().unwrap()).collect();
    assert_eq!(senders, vec!["user", "ai", "user", "ai"]);
    // AI messages carry the flow's sources; user messages carry none.
    assert_eq!(messages[0]["sources"].as_array().unwrap().len(), 0);
    assert_eq!(messages[1]["sources"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn chat_rejects_blank_message_and_unknown_chat() {
    let (base, _ctx, _dir) = start_test_daemon().await;

    let (status, body) = post(&base, "/api/v1/chat", json!({ "message": "   " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid-argument");

    let (status, body) = post(
        &base,
        "/api/v1/chat",
        json!({ "message": "hi", "chatId": "no-such-chat" }),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not-found");
}

#[tokio::test]
async fn missing_message_field_maps_to_invalid_argument() {
    let (base, _ctx, _dir) = start_test_daemon().await;

    let (status, body) = post(&base, "/api/v1/chat", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid-argument");

    // Malformed JSON gets the same treatment.
    let resp = client()
        .post(format!("{base}/api/v1/chat"))
        .bearer_auth(API_TOKEN)
        .header("x-user-id", USER)
        .header("content-type", "application/json")
        .body("{ nope")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid-argument");
}

#[tokio::test]
async fn requests_without_identity_or_token_are_rejected() {
    let (base, _ctx, _dir) = start_test_daemon().await;

    // No credentials at all.
    let resp = client()
        .post(format!("{base}/api/v1/chat"))
        .json(&json!({ "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthenticated");

    // Valid token but no user id.
    let resp = client()
        .post(format!("{base}/api/v1/chat"))
        .bearer_auth(API_TOKEN)
        .json(&json!({ "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // User id but wrong token.
    let resp = client()
        .post(format!("{base}/api/v1/chat"))
        .bearer_auth("wrong")
        .header("x-user-id", USER)
        .json(&json!({ "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

// ─── Quiz ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn quiz_generation_with_defaults_and_weak_topics() {
    let (base, ctx, _dir) = start_test_daemon().await;

    // No body fields: defaults to 5 questions from the built-in topic list.
    let (status, body) = post(&base, "/api/v1/quiz", json!({})).await;
    assert_eq!(status, 200);
    assert!(!body["quizId"].as_str().unwrap().is_empty());
    assert_eq!(body["questions"].as_array().unwrap().len(), 5);
    assert!(body["questions"][0]["question"]
        .as_str()
        .unwrap()
        .contains("Airspace"));

    // Stored weak topics steer the quiz.
    ctx.storage
        .set_weak_topics(USER, &["Density Altitude".to_string()])
        .await
        .unwrap();
    let (status, body) = post(&base, "/api/v1/quiz", json!({ "numQuestions": 3 })).await;
    assert_eq!(status, 200);
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);
    assert!(questions[0]["question"].as_str().unwrap().contains("Density Altitude"));
}

#[tokio::test]
async fn quiz_without_a_body_defaults_to_five_questions() {
    let (base, _ctx, _dir) = start_test_daemon().await;

    let resp = client()
        .post(format!("{base}/api/v1/quiz"))
        .bearer_auth(API_TOKEN)
        .header("x-user-id", USER)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["questions"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn quiz_question_count_is_bounded() {
    let (base, _ctx, _dir) = start_test_daemon().await;

    let (status, body) = post(&base, "/api/v1/quiz", json!({ "numQuestions": 0 })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid-argument");

    let (status, _) = post(&base, "/api/v1/quiz", json!({ "numQuestions": 21 })).await;
    assert_eq!(status, 400);

    let (status, body) = post(&base, "/api/v1/quiz", json!({ "numQuestions": 20 })).await;
    assert_eq!(status, 200);
    assert_eq!(body["questions"].as_array().unwrap().len(), 20);
}

// ─── Feedback ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_feedback_updates_the_message_rating() {
    let (base, ctx, _dir) = start_test_daemon().await;

    let (_, turn) = post(&base, "/api/v1/chat", json!({ "message": "hello" })).await;
    let chat_id = turn["chatId"].as_str().unwrap().to_string();
    let message_id = turn["messageId"].as_str().unwrap().to_string();

    let (status, body) = post(
        &base,
        "/api/v1/feedback",
        json!({
            "type": "chat",
            "relatedId": message_id,
            "chatId": chat_id,
            "rating": -1,
            "comment": "wrong answer"
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    let messages = ctx.storage.list_messages(&chat_id).await.unwrap();
    let ai = messages.iter().find(|m| m.id == message_id).unwrap();
    assert_eq!(ai.feedback_rating, Some(-1));
}

#[tokio::test]
async fn chat_feedback_update_failures_keep_the_master_record() {
    let (base, ctx, _dir) = start_test_daemon().await;

    let (_, turn) = post(&base, "/api/v1/chat", json!({ "message": "hello" })).await;
    let chat_id = turn["chatId"].as_str().unwrap().to_string();
    let message_id = turn["messageId"].as_str().unwrap().to_string();

    // Missing chatId: the rating cannot be updated, the submission still lands.
    let (status, body) = post(
        &base,
        "/api/v1/feedback",
        json!({ "type": "chat", "relatedId": message_id, "rating": -1 }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    // Nonexistent message: the update touches no rows, still not fatal.
    let (status, body) = post(
        &base,
        "/api/v1/feedback",
        json!({
            "type": "chat",
            "relatedId": "no-such-message",
            "chatId": chat_id,
            "rating": -1
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    // Both master feedback rows persisted; the message rating stayed unset.
    let cutoff = chrono::Utc::now() - chrono::Duration::hours(1);
    let entries = ctx.storage.feedback_since(cutoff).await.unwrap();
    assert_eq!(entries.len(), 2);
    let messages = ctx.storage.list_messages(&chat_id).await.unwrap();
    let ai = messages.iter().find(|m| m.id == message_id).unwrap();
    assert!(ai.feedback_rating.is_none());
}

#[tokio::test]
async fn feedback_validation_and_general_kind() {
    let (base, _ctx, _dir) = start_test_daemon().await;

    // Unknown type.
    let (status, _) = post(
        &base,
        "/api/v1/feedback",
        json!({ "type": "rant", "rating": -1 }),
    )
    .await;
    assert_eq!(status, 400);

    // chat/quiz require relatedId.
    let (status, _) = post(
        &base,
        "/api/v1/feedback",
        json!({ "type": "quiz", "rating": 1 }),
    )
    .await;
    assert_eq!(status, 400);

    // Rating outside {-1, 0, 1}.
    let (status, _) = post(
        &base,
        "/api/v1/feedback",
        json!({ "type": "general", "rating": 5 }),
    )
    .await;
    assert_eq!(status, 400);

    // General feedback needs no relatedId.
    let (status, body) = post(
        &base,
        "/api/v1/feedback",
        json!({ "type": "general", "rating": 0, "comment": "fine" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn repeated_downvotes_are_flagged_in_the_daily_report() {
    let (base, ctx, _dir) = start_test_daemon().await;

    let (_, turn) = post(&base, "/api/v1/chat", json!({ "message": "hello" })).await;
    let chat_id = turn["chatId"].as_str().unwrap().to_string();
    let message_id = turn["messageId"].as_str().unwrap().to_string();

    for _ in 0..5 {
        let (status, _) = post(
            &base,
            "/api/v1/feedback",
            json!({
                "type": "chat",
                "relatedId": message_id,
                "chatId": chat_id,
                "rating": -1
            }),
        )
        .await;
        assert_eq!(status, 200);
    }

    let cutoff = chrono::Utc::now() - chrono::Duration::hours(24);
    let report = aviatord::jobs::analyze_feedback(&ctx.storage, cutoff, 5)
        .await
        .unwrap();
    let flagged: Vec<String> = serde_json::from_str(&report.flagged).unwrap();
    assert_eq!(flagged, vec![message_id]);
    assert_eq!(report.total_entries, 5);
    assert_eq!(report.negative_entries, 5);
}

// ─── Health & root ────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_and_root_are_unauthenticated() {
    let (base, _ctx, _dir) = start_test_daemon().await;

    let body: Value = reqwest::get(format!("{base}/api/v1/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let body: Value = reqwest::get(format!("{base}/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["title"], "AviatorAI App");
    assert_eq!(body["message"], "Hello Firebase!");
}
