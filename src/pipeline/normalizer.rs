//! Message normalizer: raw webhook message → [`CanonicalMessage`].
//!
//! Pure and infallible. Missing fields resolve to `None`, and an unknown
//! message kind degrades to an informational body so the pipeline keeps
//! moving whatever the platform sends.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::pipeline::types::{CanonicalMessage, MessageType, RawMessage, Sender};

/// `http://` or `https://` followed by a run of non-whitespace.
static LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("link pattern is valid"));

/// Find every link in `text`, left to right, without validation or dedup.
pub fn find_links(text: Option<&str>) -> Vec<String> {
    match text {
        Some(text) if !text.is_empty() => LINK_PATTERN
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Links of `text` joined with `", "`; empty when there are none.
pub fn extract_links(text: Option<&str>) -> String {
    find_links(text).join(", ")
}

/// Normalize one raw inbound message from `sender`.
///
/// A message without a `type` field becomes `Unsupported` with the body
/// `Unsupported message type: unknown`.
pub fn normalize(raw: &RawMessage, sender: &Sender) -> CanonicalMessage {
    let message_type = raw
        .kind
        .as_deref()
        .map(MessageType::from_wire)
        .unwrap_or(MessageType::Unsupported);

    let mut media_id = None;
    let mut mime_type = None;
    let mut filename = None;

    let body = match message_type {
        MessageType::Text => raw.text.as_ref().and_then(|t| t.body.clone()),
        kind if kind.is_media() => {
            let media = raw.media(kind);
            media_id = media.and_then(|m| m.id.clone());
            mime_type = media.and_then(|m| m.mime_type.clone());
            if kind == MessageType::Document {
                filename = media.and_then(|m| m.filename.clone());
            }
            let caption = media
                .and_then(|m| m.caption.clone())
                .filter(|c| !c.is_empty());
            Some(caption.unwrap_or_else(|| format!("{kind} received")))
        }
        _ => Some(format!(
            "Unsupported message type: {}",
            raw.kind.as_deref().unwrap_or("unknown")
        )),
    };

    let message_id = raw
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));

    CanonicalMessage {
        wa_id: sender.wa_id.clone(),
        sender_name: sender.name.clone(),
        message_id,
        message_type,
        links: find_links(body.as_deref()),
        body,
        media_id,
        mime_type,
        filename,
        raw_headers: String::new(),
    }
}
