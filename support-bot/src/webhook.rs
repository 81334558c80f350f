//! HTTP surface: Telegram webhook, generic external-source webhook and health check.
//!
//! Webhooks are always acknowledged with 200 once the secret matches; processing failures are
//! logged, never reported back, so Telegram does not redeliver them.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use desk_core::Platform;
use handler_chain::HandlerChain;
use serde::Deserialize;
use serde_json::json;
use storage::CustomerProfile;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument, warn};

use crate::desk::Desk;
use crate::jobs::Job;
use crate::outbound::OutboundMessage;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
pub struct WebhookState {
    pub chain: Arc<HandlerChain>,
    pub desk: Desk,
}

/// Message from a non-Telegram source, routed into the same topic contract.
#[derive(Debug, Deserialize)]
pub struct ExternalMessage {
    pub source: String,
    pub external_id: i64,
    pub text: String,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook/telegram", post(telegram_webhook))
        .route("/webhook/external", post(external_webhook))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn ack() -> Response {
    (StatusCode::OK, Json(json!({ "ok": true }))).into_response()
}

fn secret_matches(state: &WebhookState, headers: &HeaderMap) -> bool {
    match state.desk.settings.webhook_secret.as_deref() {
        Some(expected) => headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|got| got == expected),
        None => true,
    }
}

#[instrument(skip_all)]
async fn telegram_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !secret_matches(&state, &headers) {
        warn!("Webhook secret mismatch");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Malformed webhook body");
            return ack();
        }
    };
    let update = match desk_telegram::parse_update(raw) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "Unrecognised update");
            return ack();
        }
    };

    match state.chain.handle(&update).await {
        Ok(response) => debug!(update_id = update.update_id, response = ?response, "Webhook handled"),
        Err(e) => error!(update_id = update.update_id, error = %e, "Webhook processing failed"),
    }
    ack()
}

#[instrument(skip_all)]
async fn external_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !secret_matches(&state, &headers) {
        warn!("External webhook secret mismatch");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let message: ExternalMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Malformed external message");
            return (StatusCode::BAD_REQUEST, Json(json!({ "ok": false }))).into_response();
        }
    };
    if let Err(e) = relay_external(&state.desk, &message).await {
        error!(source = %message.source, external_id = message.external_id, error = %e, "External message not relayed");
    }
    ack()
}

async fn relay_external(desk: &Desk, message: &ExternalMessage) -> desk_core::Result<()> {
    let text = message.text.trim();
    if text.is_empty() {
        debug!(source = %message.source, "Empty external message");
        return Ok(());
    }
    let profile = CustomerProfile {
        username: Some(message.source.clone()),
        ..CustomerProfile::default()
    };
    let customer = desk
        .db
        .customers
        .get_or_create(Platform::ExternalSource, message.external_id, &profile)
        .await?;
    if customer.is_banned {
        info!(customer_id = customer.id, "Banned external customer, dropping message");
        return Ok(());
    }
    desk.jobs.dispatch_now(Job::DeliverToTopic {
        customer_id: customer.id,
        message: OutboundMessage::text(text),
        source_message_id: None,
        topic_recreated: false,
    });
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
