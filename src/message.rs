//! Provider-agnostic message model.
//!
//! A [`Message`] is a sum type: every variant carries exactly the content
//! shape its type tag allows, so a type/content mismatch cannot exist once a
//! value has been built. Untyped input (a [`MessageType`] plus a JSON payload,
//! as arrives from the CLI or the wire) is validated by [`Message::from_parts`],
//! which is the only place [`ImError::ContentMismatch`] is raised.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ImError;

/// Message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text.
    Text,
    /// Image referenced by an uploaded media ID.
    Image,
    /// Voice clip referenced by an uploaded media ID.
    Voice,
    /// Video referenced by an uploaded media ID.
    Video,
    /// Arbitrary file referenced by an uploaded media ID.
    File,
    /// Text card with a link button.
    #[serde(rename = "textcard")]
    TextCard,
    /// One or more linked articles.
    News,
    /// Markdown text.
    Markdown,
}

impl MessageType {
    /// Every message type, in declaration order.
    pub const ALL: [MessageType; 8] = [
        Self::Text,
        Self::Image,
        Self::Voice,
        Self::Video,
        Self::File,
        Self::TextCard,
        Self::News,
        Self::Markdown,
    ];

    /// Wire name of the type (`"text"`, `"textcard"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::File => "file",
            Self::TextCard => "textcard",
            Self::News => "news",
            Self::Markdown => "markdown",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown message type: {s:?}"))
    }
}

/// Image content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageContent {
    /// Provider media ID of the uploaded image.
    pub media_id: String,
}

/// Voice content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoiceContent {
    /// Provider media ID of the uploaded clip.
    pub media_id: String,
    /// Clip length in seconds.
    #[serde(default)]
    pub duration: u32,
}

/// Video content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VideoContent {
    /// Provider media ID of the uploaded video.
    pub media_id: String,
    /// Video title.
    #[serde(default)]
    pub title: String,
    /// Video description.
    #[serde(default)]
    pub description: String,
}

/// File content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileContent {
    /// Provider media ID of the uploaded file.
    pub media_id: String,
}

/// Text card content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextCardContent {
    /// Card title.
    pub title: String,
    /// Card body.
    pub description: String,
    /// Link opened by the card.
    pub url: String,
    /// Button label.
    #[serde(default)]
    pub button_text: String,
}

/// A single article in a news message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewsArticle {
    /// Article title.
    pub title: String,
    /// Article summary.
    #[serde(default)]
    pub description: String,
    /// Article link.
    pub url: String,
    /// Cover image link.
    #[serde(default)]
    pub pic_url: String,
}

/// News content: an ordered list of articles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewsContent {
    /// Articles, in display order.
    pub articles: Vec<NewsArticle>,
}

/// Markdown content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkdownContent {
    /// Markdown source.
    pub content: String,
}

/// A provider-agnostic message.
///
/// Serializes as `{"type": "...", "content": ...}`. Deserialization goes
/// through [`Message::from_parts`], so malformed content is reported as
/// [`ImError::ContentMismatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "content",
    rename_all = "lowercase",
    try_from = "RawMessage"
)]
pub enum Message {
    /// Plain text.
    Text(String),
    /// Image.
    Image(ImageContent),
    /// Voice clip.
    Voice(VoiceContent),
    /// Video.
    Video(VideoContent),
    /// File.
    File(FileContent),
    /// Text card.
    #[serde(rename = "textcard")]
    TextCard(TextCardContent),
    /// News articles.
    News(NewsContent),
    /// Markdown.
    Markdown(MarkdownContent),
}

impl Message {
    /// Plain text message.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    /// Image message for an uploaded media ID.
    pub fn image(media_id: impl Into<String>) -> Self {
        Self::Image(ImageContent {
            media_id: media_id.into(),
        })
    }

    /// Markdown message.
    pub fn markdown(content: impl Into<String>) -> Self {
        Self::Markdown(MarkdownContent {
            content: content.into(),
        })
    }

    /// The type tag of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Text(_) => MessageType::Text,
            Self::Image(_) => MessageType::Image,
            Self::Voice(_) => MessageType::Voice,
            Self::Video(_) => MessageType::Video,
            Self::File(_) => MessageType::File,
            Self::TextCard(_) => MessageType::TextCard,
            Self::News(_) => MessageType::News,
            Self::Markdown(_) => MessageType::Markdown,
        }
    }

    /// Build a message from a declared type and an untyped JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`ImError::ContentMismatch`] when `content` does not have the
    /// shape `msg_type` requires (e.g. a bare string for an image).
    pub fn from_parts(msg_type: MessageType, content: Value) -> Result<Self, ImError> {
        let mismatch = |_: serde_json::Error| ImError::ContentMismatch { expected: msg_type };
        let message = match msg_type {
            MessageType::Text => Self::Text(serde_json::from_value(content).map_err(mismatch)?),
            MessageType::Image => Self::Image(serde_json::from_value(content).map_err(mismatch)?),
            MessageType::Voice => Self::Voice(serde_json::from_value(content).map_err(mismatch)?),
            MessageType::Video => Self::Video(serde_json::from_value(content).map_err(mismatch)?),
            MessageType::File => Self::File(serde_json::from_value(content).map_err(mismatch)?),
            MessageType::TextCard => {
                Self::TextCard(serde_json::from_value(content).map_err(mismatch)?)
            }
            MessageType::News => Self::News(serde_json::from_value(content).map_err(mismatch)?),
            MessageType::Markdown => {
                Self::Markdown(serde_json::from_value(content).map_err(mismatch)?)
            }
        };
        Ok(message)
    }
}

/// Untyped `{type, content}` pair as received from callers.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    msg_type: MessageType,
    #[serde(default)]
    content: Value,
}

impl TryFrom<RawMessage> for Message {
    type Error = ImError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        Self::from_parts(raw.msg_type, raw.content)
    }
}
