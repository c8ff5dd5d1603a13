//! Integration tests for the webhook → store → channel → processors path.
//!
//! Each test spins up an Axum server on a random port backed by an in-memory
//! store and an in-process bus, and drives it over real HTTP with reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use wa_relay::bus::{MemoryBus, MessagePublisher, MessageSource, decode};
use wa_relay::error::{BusError, ProcessorError};
use wa_relay::pipeline::Dispatcher;
use wa_relay::pipeline::types::{CanonicalMessage, MessageType};
use wa_relay::processors::{LoggingProcessor, Processor};
use wa_relay::store::{LibSqlStore, MessageStore};
use wa_relay::subscriber::Subscriber;
use wa_relay::webhook::webhook_routes;

/// Maximum time any test step is allowed to take before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Forwards every message it sees to a channel.
struct Recorder(mpsc::UnboundedSender<CanonicalMessage>);

#[async_trait]
impl Processor for Recorder {
    async fn process(&self, message: &CanonicalMessage) -> Result<bool, ProcessorError> {
        let _ = self.0.send(message.clone());
        Ok(true)
    }
}

/// Publisher whose channel is always down.
struct DownPublisher;

#[async_trait]
impl MessagePublisher for DownPublisher {
    async fn publish(&self, _message: &CanonicalMessage) -> Result<(), BusError> {
        Err(BusError::Publish {
            channel: "whatsapp_messages".into(),
            reason: "connection refused".into(),
        })
    }
}

/// Start the webhook on a random port; return its base URL.
async fn start_server(store: Arc<LibSqlStore>, publisher: Arc<dyn MessagePublisher>) -> String {
    let app = webhook_routes(store, publisher);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

async fn new_store() -> Arc<LibSqlStore> {
    Arc::new(LibSqlStore::new_memory().await.unwrap())
}

fn callback(value: Value) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{ "id": "biz-1", "changes": [{ "field": "messages", "value": value }] }]
    })
}

fn text_callback(id: &str, body: &str) -> Value {
    callback(json!({
        "messaging_product": "whatsapp",
        "contacts": [{ "wa_id": "15551234567", "profile": { "name": "Alice" } }],
        "messages": [{ "id": id, "from": "15551234567", "type": "text", "text": { "body": body } }]
    }))
}

async fn post_json(base: &str, payload: &Value) -> (u16, Value) {
    let resp = timeout(
        TEST_TIMEOUT,
        reqwest::Client::new()
            .post(format!("{base}/whatsappwebhook"))
            .json(payload)
            .send(),
    )
    .await
    .unwrap()
    .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn get_json(url: &str) -> Value {
    timeout(TEST_TIMEOUT, reqwest::get(url))
        .await
        .unwrap()
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn wait_for_subscribers(bus: &MemoryBus, count: usize) {
    timeout(TEST_TIMEOUT, async {
        while bus.subscriber_count() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber did not attach");
}

// ── Static endpoints ─────────────────────────────────────────────────────

#[tokio::test]
async fn static_endpoints_respond() {
    let base = start_server(new_store().await, Arc::new(MemoryBus::new("t"))).await;

    assert_eq!(get_json(&format!("{base}/")).await, json!({"message": "Vanakkam"}));
    assert_eq!(get_json(&format!("{base}/test")).await, json!({"status": "All okay"}));

    let resp = reqwest::Client::new().post(format!("{base}/")).send().await.unwrap();
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"message": "Post received"}));
}

#[tokio::test]
async fn verification_challenge_is_echoed() {
    let base = start_server(new_store().await, Arc::new(MemoryBus::new("t"))).await;

    let url = format!(
        "{base}/whatsappwebhook?hub.mode=subscribe&hub.verify_token=anything&hub.challenge=1158201444"
    );
    let resp = timeout(TEST_TIMEOUT, reqwest::get(url)).await.unwrap().unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.unwrap(), "1158201444");

    let params = get_json(&format!("{base}/whatsappwebhook?foo=bar")).await;
    assert_eq!(params["query_params"]["foo"], "bar");
}

// ── Ingestion ────────────────────────────────────────────────────────────

#[tokio::test]
async fn text_message_is_stored_published_and_dispatched() {
    let store = new_store().await;
    let bus = Arc::new(MemoryBus::new("whatsapp_messages"));
    let base = start_server(store.clone(), bus.clone()).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let processors: Vec<Arc<dyn Processor>> =
        vec![Arc::new(LoggingProcessor::new()), Arc::new(Recorder(tx))];
    let dispatcher = Arc::new(Dispatcher::with_processors(processors));
    let subscriber = Subscriber::new(dispatcher, bus.clone());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        subscriber
            .run(async {
                let _ = stop_rx.await;
            })
            .await
    });
    wait_for_subscribers(&bus, 1).await;

    let (status, body) = post_json(
        &base,
        &text_callback("wamid.A1", "Check https://example.com and http://test.org/x"),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "logged"}));

    let received = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(received.message_id, "wamid.A1");
    assert_eq!(received.wa_id, "15551234567");
    assert_eq!(received.sender_name.as_deref(), Some("Alice"));
    assert_eq!(received.message_type, MessageType::Text);
    assert_eq!(
        received.links,
        vec!["https://example.com".to_string(), "http://test.org/x".to_string()]
    );
    // Headers stay with the stored record; they are not part of the wire shape.
    assert!(received.raw_headers.is_empty());

    let stored = store.get_message("wamid.A1").await.unwrap().unwrap();
    assert_eq!(stored.links, "https://example.com, http://test.org/x");
    let headers: Value = serde_json::from_str(&stored.headers).unwrap();
    assert_eq!(headers["content-type"], "application/json");

    stop_tx.send(()).unwrap();
    let summary = timeout(TEST_TIMEOUT, handle).await.unwrap().unwrap();
    assert_eq!(summary.dispatched, 1);
}

#[tokio::test]
async fn duplicate_delivery_is_acknowledged_once() {
    let store = new_store().await;
    let bus = Arc::new(MemoryBus::new("whatsapp_messages"));
    let base = start_server(store.clone(), bus.clone()).await;
    let mut stream = bus.subscribe().await.unwrap();

    let payload = text_callback("wamid.DUP", "hello");
    assert_eq!(post_json(&base, &payload).await.1, json!({"status": "logged"}));
    assert_eq!(post_json(&base, &payload).await.1, json!({"status": "duplicate"}));

    let first = timeout(TEST_TIMEOUT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(decode(&first).unwrap().message_id, "wamid.DUP");
    assert!(
        timeout(Duration::from_millis(200), stream.next()).await.is_err(),
        "duplicate must not be republished"
    );

    assert_eq!(store.list_messages().await.unwrap().len(), 1);
}

#[tokio::test]
async fn media_message_uses_caption() {
    let store = new_store().await;
    let base = start_server(store.clone(), Arc::new(MemoryBus::new("t"))).await;

    let payload = callback(json!({
        "contacts": [{ "wa_id": "1", "profile": { "name": "Bob" } }],
        "messages": [{
            "id": "wamid.IMG",
            "type": "image",
            "image": { "id": "media-9", "mime_type": "image/jpeg", "caption": "look https://pics.io/1" }
        }]
    }));
    assert_eq!(post_json(&base, &payload).await.1, json!({"status": "logged"}));

    let stored = store.get_message("wamid.IMG").await.unwrap().unwrap();
    assert_eq!(stored.message_type, "image");
    assert_eq!(stored.message_body.as_deref(), Some("look https://pics.io/1"));
    assert_eq!(stored.media_id.as_deref(), Some("media-9"));
    assert_eq!(stored.mime_type.as_deref(), Some("image/jpeg"));
    assert!(stored.filename.is_none());
    assert_eq!(stored.links, "https://pics.io/1");
}

#[tokio::test]
async fn status_callback_is_ignored() {
    let store = new_store().await;
    let base = start_server(store.clone(), Arc::new(MemoryBus::new("t"))).await;

    let payload = callback(json!({
        "statuses": [{ "id": "wamid.X", "status": "read", "recipient_id": "1" }]
    }));
    let (status, body) = post_json(&base, &payload).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "ignored"}));
    assert!(store.list_messages().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_payload_is_rejected() {
    let store = new_store().await;
    let base = start_server(store.clone(), Arc::new(MemoryBus::new("t"))).await;

    let (status, body) = post_json(&base, &json!({"entry": []})).await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("missing entry"));

    let resp = reqwest::Client::new()
        .post(format!("{base}/whatsappwebhook"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    assert!(store.list_messages().await.unwrap().is_empty());
}

#[tokio::test]
async fn publish_failure_still_logs_message() {
    let store = new_store().await;
    let base = start_server(store.clone(), Arc::new(DownPublisher)).await;

    let (status, body) = post_json(&base, &text_callback("wamid.DOWN", "hi")).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "logged"}));
    assert!(store.get_message("wamid.DOWN").await.unwrap().is_some());
}

#[tokio::test]
async fn stored_messages_are_listed() {
    let store = new_store().await;
    let base = start_server(store, Arc::new(MemoryBus::new("t"))).await;

    post_json(&base, &text_callback("wamid.L1", "one")).await;
    post_json(&base, &text_callback("wamid.L2", "two https://a.b")).await;

    let listed = get_json(&format!("{base}/whatsappmessages")).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["message_id"], "wamid.L1");
    assert_eq!(listed[1]["message_body"], "two https://a.b");
    assert_eq!(listed[1]["links"], "https://a.b");
    assert_eq!(listed[1]["sender_name"], "Alice");
}
