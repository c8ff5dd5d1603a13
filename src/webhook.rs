//! HTTP webhook endpoint for the WhatsApp Cloud API.
//!
//! Receives inbound-message callbacks, normalizes them, stores them and
//! publishes them to the channel the subscriber listens on.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::bus::MessagePublisher;
use crate::error::WebhookError;
use crate::pipeline::normalizer::normalize;
use crate::pipeline::types::{RawMessage, Sender};
use crate::store::{InsertOutcome, MessageStore};

/// Query parameter carrying the subscription-verification challenge.
const CHALLENGE_PARAM: &str = "hub.challenge";

/// Shared handler state.
#[derive(Clone)]
pub struct WebhookState {
    pub store: Arc<dyn MessageStore>,
    pub publisher: Arc<dyn MessagePublisher>,
}

/// Build the webhook router.
pub fn webhook_routes(
    store: Arc<dyn MessageStore>,
    publisher: Arc<dyn MessagePublisher>,
) -> Router {
    let state = WebhookState { store, publisher };

    Router::new()
        .route("/", get(root).post(root_post))
        .route("/test", get(test_endpoint))
        .route("/whatsappwebhook", get(verify).post(receive))
        .route("/whatsappmessages", get(list_messages))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Envelope ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<RawMessage>,
    #[serde(default)]
    contacts: Vec<Contact>,
}

#[derive(Debug, Deserialize)]
struct Contact {
    #[serde(default)]
    wa_id: Option<String>,
    #[serde(default)]
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    name: Option<String>,
}

/// Pull the first message and its sender out of a callback body.
///
/// `Ok(None)` means a well-formed callback with no message in it, such as a
/// delivery-status update.
pub fn parse_envelope(body: &[u8]) -> Result<Option<(RawMessage, Sender)>, WebhookError> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| WebhookError::MalformedPayload(format!("invalid JSON: {e}")))?;

    let value = envelope
        .entry
        .into_iter()
        .next()
        .ok_or_else(|| WebhookError::MalformedPayload("missing entry".into()))?
        .changes
        .into_iter()
        .next()
        .ok_or_else(|| WebhookError::MalformedPayload("missing changes".into()))?
        .value;

    let Some(message) = value.messages.into_iter().next() else {
        return Ok(None);
    };

    let contact = value
        .contacts
        .into_iter()
        .next()
        .ok_or_else(|| WebhookError::MalformedPayload("missing contacts".into()))?;
    let wa_id = contact
        .wa_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| WebhookError::MalformedPayload("missing contact wa_id".into()))?;

    let sender = Sender {
        wa_id,
        name: contact.profile.and_then(|p| p.name),
    };
    Ok(Some((message, sender)))
}

/// Serialize request headers into a JSON object string.
pub fn headers_json(headers: &HeaderMap) -> String {
    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                serde_json::Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            )
        })
        .collect();
    serde_json::Value::Object(map).to_string()
}

// ── Handlers ────────────────────────────────────────────────────────────

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({"message": "Vanakkam"}))
}

async fn root_post() -> impl IntoResponse {
    Json(serde_json::json!({"message": "Post received"}))
}

async fn test_endpoint() -> impl IntoResponse {
    Json(serde_json::json!({"status": "All okay"}))
}

async fn verify(Query(params): Query<HashMap<String, String>>) -> Response {
    match params.get(CHALLENGE_PARAM) {
        Some(challenge) => {
            info!("Webhook verification challenge received");
            challenge.clone().into_response()
        }
        None => Json(serde_json::json!({"query_params": params})).into_response(),
    }
}

async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, WebhookError> {
    let Some((raw, sender)) = parse_envelope(&body)? else {
        debug!("Webhook callback without messages ignored");
        return Ok(Json(serde_json::json!({"status": "ignored"})));
    };

    let message = normalize(&raw, &sender).with_raw_headers(headers_json(&headers));

    match state.store.insert_message(&message).await? {
        InsertOutcome::Inserted(id) => {
            info!(
                id,
                message_id = %message.message_id,
                wa_id = %message.wa_id,
                message_type = %message.message_type,
                "Received message saved"
            );
        }
        InsertOutcome::Duplicate => {
            info!(message_id = %message.message_id, "Duplicate delivery acknowledged");
            return Ok(Json(serde_json::json!({"status": "duplicate"})));
        }
    }

    if let Err(e) = state.publisher.publish(&message).await {
        warn!(message_id = %message.message_id, error = %e, "Failed to publish message");
    }

    Ok(Json(serde_json::json!({"status": "logged"})))
}

async fn list_messages(State(state): State<WebhookState>) -> Result<Response, WebhookError> {
    let messages = state.store.list_messages().await?;
    Ok(Json(messages).into_response())
}
