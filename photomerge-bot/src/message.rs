//! Message types for channel communication.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Channel type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Telegram,
}

impl ChannelType {
    /// Get the channel type as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
        }
    }
}

/// Opaque handle to an image held by the messaging transport.
///
/// Recording one is cheap; the bytes are only fetched when the upload phase
/// ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    /// Transport-level file identifier
    pub file_id: String,
    /// Size reported by the transport, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl AssetRef {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            size_bytes: None,
        }
    }
}

/// Unified inbound message format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (channel-specific)
    pub id: String,
    /// Channel type
    pub channel_type: ChannelType,
    /// Chat the reply goes to
    pub channel_id: String,
    /// User identifier; sessions are keyed by this
    pub user_id: String,
    /// Human-readable sender name (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Message content
    pub content: MessageContent,
    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
    /// Trace ID following this update through the bot
    #[serde(default)]
    pub trace_id: String,
}

/// Message content types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    /// Plain text message
    Text { text: String },
    /// Photo, or an image sent as a file
    Image {
        asset: AssetRef,
        caption: Option<String>,
    },
    /// Anything the bot has no use for (stickers, voice, non-image files...)
    Other { kind: String },
}

/// Outgoing message to send to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target channel type
    pub channel_type: ChannelType,
    /// Target channel ID
    pub channel_id: String,
    /// Reply to message ID (optional)
    pub reply_to: Option<String>,
    /// Message content
    pub content: OutgoingContent,
}

/// Outgoing message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingContent {
    /// Plain text
    Text { text: String },
    /// File
    File {
        data: Vec<u8>,
        filename: String,
        mime_type: Option<String>,
    },
}

impl OutgoingMessage {
    /// Plain text reply to the chat a message came from.
    pub fn text_reply(to: &ChannelMessage, text: impl Into<String>) -> Self {
        Self {
            channel_type: to.channel_type,
            channel_id: to.channel_id.clone(),
            reply_to: None,
            content: OutgoingContent::Text { text: text.into() },
        }
    }
}

/// A bot command parsed out of a text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    Exit,
    Finish,
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Parse `/name` or `/name@botname`, ignoring trailing arguments.
    ///
    /// Returns `None` for ordinary text.
    pub fn parse(text: &'a str) -> Option<Self> {
        let rest = text.trim().strip_prefix('/')?;
        let word = rest.split_whitespace().next().unwrap_or("");
        let name = word.split('@').next().unwrap_or("");
        Some(match name {
            "start" => Self::Start,
            "exit" => Self::Exit,
            "f" => Self::Finish,
            other => Self::Unknown(other),
        })
    }
}

impl ChannelMessage {
    /// Get the text content if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }

    /// The command carried by this message, if it is one.
    pub fn command(&self) -> Option<Command<'_>> {
        self.text().and_then(Command::parse)
    }

    /// The image handle carried by this message, if any.
    pub fn asset(&self) -> Option<&AssetRef> {
        match &self.content {
            MessageContent::Image { asset, .. } => Some(asset),
            _ => None,
        }
    }

    /// Get the channel type as a string.
    pub fn channel_type_str(&self) -> &'static str {
        self.channel_type.as_str()
    }
}
