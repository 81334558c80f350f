//! HTTP surface: routing, secret check and the external-source relay.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::setup;
use desk_core::Platform;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use support_bot::webhook::{router, SECRET_HEADER};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, secret: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header(SECRET_HEADER, secret);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_health() {
    let t = setup().await;
    let response = router(t.webhook_state())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

/// **Test: Wrong or missing secret is rejected before any processing.**
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_telegram_webhook_checks_secret() {
    let t = setup().await;
    let app = router(t.webhook_state());

    let response = app
        .clone()
        .oneshot(post("/webhook/telegram", Some("wrong"), "{}".into()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(post("/webhook/telegram", None, "{}".into()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// **Test: Garbage bodies are acknowledged so Telegram does not redeliver them.**
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_telegram_webhook_acks_malformed_body() {
    let t = setup().await;
    let response = router(t.webhook_state())
        .oneshot(post("/webhook/telegram", Some("s3cret"), "not json".into()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ok"], true);
}

/// **Test: A private /start through the webhook greets an unknown customer.**
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_telegram_webhook_runs_chain() {
    let t = setup().await;
    let update = json!({
        "update_id": 10,
        "message": {
            "message_id": 5,
            "date": 1700000000,
            "chat": { "id": 4242, "type": "private", "first_name": "Anna" },
            "from": { "id": 4242, "is_bot": false, "first_name": "Anna" },
            "text": "/start",
            "entities": [{ "type": "bot_command", "offset": 0, "length": 6 }]
        }
    });

    let response = router(t.webhook_state())
        .oneshot(post("/webhook/telegram", Some("s3cret"), update.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    t.settle().await;

    assert_eq!(
        t.api.sent_texts(support_bot::messages::WELCOME).len(),
        1
    );
    let deleted = t.api.calls("deleteMessage");
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0]["message_id"], 5);
}

/// **Test: An external-source message creates the customer and lands in a new topic.**
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_external_message_is_relayed_to_topic() {
    let t = setup().await;
    let body = json!({ "source": "website", "external_id": 777, "text": "Callback please" });

    let response = router(t.webhook_state())
        .oneshot(post("/webhook/external", Some("s3cret"), body.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    t.settle().await;

    let customer = t
        .desk
        .db
        .customers
        .find_by_chat(Platform::ExternalSource, 777)
        .await
        .unwrap()
        .expect("external customer");
    let topic_id = customer.topic_id.expect("topic created");

    let created = t.api.calls("createForumTopic");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["name"], "#1 (website)");
    let sent = t.api.sent_texts("Callback please");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["message_thread_id"], topic_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_external_message_rejects_bad_body() {
    let t = setup().await;
    let response = router(t.webhook_state())
        .oneshot(post("/webhook/external", Some("s3cret"), json!({ "text": "x" }).to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
