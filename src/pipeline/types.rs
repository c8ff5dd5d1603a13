//! Shared types for the normalization and dispatch pipeline.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ── Message type ────────────────────────────────────────────────────

/// Kind of inbound chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    #[serde(other)]
    Unsupported,
}

impl MessageType {
    /// Map an upstream `type` discriminator to a message type.
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "text" => Self::Text,
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "document" => Self::Document,
            "sticker" => Self::Sticker,
            _ => Self::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Sticker => "sticker",
            Self::Unsupported => "unsupported",
        }
    }

    /// Whether messages of this type carry a media attachment.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            Self::Image | Self::Video | Self::Audio | Self::Document | Self::Sticker
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Raw inbound message ─────────────────────────────────────────────

/// One entry of the webhook's `messages` array, as the platform sends it.
///
/// Every field is optional: absent fields resolve to `None` instead of
/// failing the parse.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<TextPayload>,
    #[serde(default)]
    pub image: Option<MediaPayload>,
    #[serde(default)]
    pub video: Option<MediaPayload>,
    #[serde(default)]
    pub audio: Option<MediaPayload>,
    #[serde(default)]
    pub document: Option<MediaPayload>,
    #[serde(default)]
    pub sticker: Option<MediaPayload>,
}

impl RawMessage {
    /// Nested media object keyed by the given type name.
    pub fn media(&self, kind: MessageType) -> Option<&MediaPayload> {
        match kind {
            MessageType::Image => self.image.as_ref(),
            MessageType::Video => self.video.as_ref(),
            MessageType::Audio => self.audio.as_ref(),
            MessageType::Document => self.document.as_ref(),
            MessageType::Sticker => self.sticker.as_ref(),
            MessageType::Text | MessageType::Unsupported => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextPayload {
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Who sent the message, taken from the webhook's `contacts` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub wa_id: String,
    pub name: Option<String>,
}

// ── Canonical message ───────────────────────────────────────────────

/// Normalized record of one inbound chat event.
///
/// Built once by [`normalize`](crate::pipeline::normalizer::normalize) and
/// passed by reference to storage, publication, and every processor.
/// Serializes to the pub/sub wire shape; `raw_headers` stays local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    /// Sender's platform identifier.
    pub wa_id: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Idempotency key for storage.
    pub message_id: String,
    pub message_type: MessageType,
    #[serde(rename = "message_body", default)]
    pub body: Option<String>,
    #[serde(default)]
    pub media_id: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    /// URLs found in `body`, in order of appearance.
    #[serde(
        default,
        serialize_with = "serialize_links",
        deserialize_with = "deserialize_links"
    )]
    pub links: Vec<String>,
    /// Request headers of the originating webhook call, as a JSON blob.
    #[serde(skip)]
    pub raw_headers: String,
}

impl CanonicalMessage {
    /// Links in their wire form: joined with `", "`.
    pub fn links_joined(&self) -> String {
        self.links.join(", ")
    }

    pub fn has_links(&self) -> bool {
        !self.links.is_empty()
    }

    /// Attach the originating request headers.
    pub fn with_raw_headers(mut self, headers: impl Into<String>) -> Self {
        self.raw_headers = headers.into();
        self
    }
}

fn serialize_links<S: Serializer>(links: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&links.join(", "))
}

fn deserialize_links<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let joined: Option<String> = Option::deserialize(deserializer)?;
    Ok(joined
        .unwrap_or_default()
        .split(", ")
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}
