//! Core types: platform, inbound update and its payload descriptors, handler response, Handler and Middleware traits.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform a customer talks to the desk through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Telegram,
    Vk,
    ExternalSource,
    /// Stored customers whose traffic is dropped on purpose.
    Ignore,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Telegram => "telegram",
            Platform::Vk => "vk",
            Platform::ExternalSource => "external_source",
            Platform::Ignore => "ignore",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Platform::Telegram),
            "vk" => Ok(Platform::Vk),
            "external_source" | "external" => Ok(Platform::ExternalSource),
            "ignore" => Ok(Platform::Ignore),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Kind of chat an update originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Private,
    Group,
    Supergroup,
    Channel,
    Unknown,
}

impl SourceType {
    pub fn from_chat_type(chat_type: &str) -> Self {
        match chat_type {
            "private" => SourceType::Private,
            "group" => SourceType::Group,
            "supergroup" => SourceType::Supergroup,
            "channel" => SourceType::Channel,
            _ => SourceType::Unknown,
        }
    }
}

/// Which part of the webhook payload carried the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Message,
    EditedMessage,
    CallbackQuery,
    Other,
}

/// Sender identity (id, bot flag, username, names).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Text formatting span; offsets and lengths are in UTF-16 code units, as Telegram sends them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_emoji_id: Option<String>,
}

/// Media shapes the desk can relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Document,
    Audio,
    Video,
    Voice,
    VideoNote,
    Sticker,
}

impl MediaKind {
    /// Bot API method that sends this media kind.
    pub fn send_method(&self) -> &'static str {
        match self {
            MediaKind::Photo => "sendPhoto",
            MediaKind::Document => "sendDocument",
            MediaKind::Audio => "sendAudio",
            MediaKind::Video => "sendVideo",
            MediaKind::Voice => "sendVoice",
            MediaKind::VideoNote => "sendVideoNote",
            MediaKind::Sticker => "sendSticker",
        }
    }

    /// Parameter name that carries the file id for [`send_method`](Self::send_method).
    pub fn param_name(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Voice => "voice",
            MediaKind::VideoNote => "video_note",
            MediaKind::Sticker => "sticker",
        }
    }

    /// Whether the send method accepts a caption.
    pub fn accepts_caption(&self) -> bool {
        !matches!(self, MediaKind::VideoNote | MediaKind::Sticker)
    }

    pub fn as_str(&self) -> &'static str {
        self.param_name()
    }
}

/// One media attachment; for photos this is the largest size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    pub kind: MediaKind,
    pub file_id: String,
}

/// Shared contact ("share phone" button or forwarded contact card).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPayload {
    pub phone_number: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Inline keyboard press.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub data: String,
}

/// Platform-neutral view of one webhook update.
///
/// `chat_id` is the chat the update happened in (the customer's private chat, or the support
/// group for topic traffic). `thread_id` is the forum topic id when the update came from a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub kind: UpdateKind,
    pub source: SourceType,
    pub chat_id: i64,
    pub message_id: Option<i64>,
    pub thread_id: Option<i64>,
    pub from: Option<User>,
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Entities of `text`, or of `caption` for media messages.
    pub entities: Vec<MessageEntity>,
    /// Media attachments in payload order; a Telegram message normally carries one.
    pub media: Vec<MediaFile>,
    pub contact: Option<ContactPayload>,
    pub location: Option<Location>,
    pub callback: Option<CallbackQuery>,
    pub media_group_id: Option<String>,
    pub reply_to_message_id: Option<i64>,
    /// New name carried by a `forum_topic_edited` service message.
    pub topic_edited_name: Option<String>,
    pub is_edited: bool,
    pub is_pinned: bool,
    pub is_forwarded: bool,
    pub received_at: DateTime<Utc>,
    /// Untouched platform payload for edge cases.
    pub raw: serde_json::Value,
}

impl InboundUpdate {
    /// Empty update of the given kind; adapters and tests fill in the rest.
    pub fn new(update_id: i64, kind: UpdateKind, source: SourceType, chat_id: i64) -> Self {
        Self {
            update_id,
            kind,
            source,
            chat_id,
            message_id: None,
            thread_id: None,
            from: None,
            text: None,
            caption: None,
            entities: Vec::new(),
            media: Vec::new(),
            contact: None,
            location: None,
            callback: None,
            media_group_id: None,
            reply_to_message_id: None,
            topic_edited_name: None,
            is_edited: false,
            is_pinned: false,
            is_forwarded: false,
            received_at: Utc::now(),
            raw: serde_json::Value::Null,
        }
    }

    /// True when the sender is a bot (including this bot's own service messages).
    pub fn is_bot(&self) -> bool {
        self.from.as_ref().map(|u| u.is_bot).unwrap_or(false)
    }

    pub fn is_private(&self) -> bool {
        self.source == SourceType::Private
    }

    pub fn is_supergroup(&self) -> bool {
        self.source == SourceType::Supergroup
    }

    /// Non-empty text, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    /// First attachment whose kind appears earliest in `priority`.
    pub fn first_media(&self, priority: &[MediaKind]) -> Option<&MediaFile> {
        priority
            .iter()
            .find_map(|kind| self.media.iter().find(|m| m.kind == *kind))
    }

    /// Whether the message text is `command`, `command@bot` or `command args`.
    pub fn is_command(&self, command: &str) -> bool {
        match self.text() {
            Some(text) => matches_command(text, command),
            None => false,
        }
    }

    /// Arguments after a command (`/rename_topic New name` yields `New name`).
    pub fn command_args(&self) -> Option<&str> {
        let text = self.text()?;
        let (_, rest) = text.split_once(char::is_whitespace)?;
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// Command matcher shared by private and group routing.
pub fn matches_command(text: &str, command: &str) -> bool {
    let Some(rest) = text.strip_prefix(command) else {
        return false;
    };
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        return true;
    }
    if let Some(after_at) = rest.strip_prefix('@') {
        let bot_len = after_at
            .find(char::is_whitespace)
            .unwrap_or(after_at.len());
        let bot = &after_at[..bot_len];
        return !bot.is_empty() && bot.chars().all(|c| c.is_alphanumeric() || c == '_');
    }
    false
}

/// Handler result for the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResponse {
    /// Pass to next handler.
    Continue,
    /// The update was consumed; stop the chain.
    Stop,
    /// Skip this handler, try next.
    Ignore,
}

/// Single handler concept: optional before / handle / after. Chain runs all before → handle until Stop → all after (reverse).
#[async_trait]
pub trait Handler: Send + Sync {
    /// Runs before the handle phase. Return false to stop the chain.
    async fn before(&self, _update: &InboundUpdate) -> crate::error::Result<bool> {
        Ok(true)
    }
    /// Processes the update. Return Stop to end the handle phase. Default: Continue.
    async fn handle(&self, _update: &InboundUpdate) -> crate::error::Result<HandlerResponse> {
        Ok(HandlerResponse::Continue)
    }
    /// Runs after the handle phase (reverse order), with the final response.
    async fn after(
        &self,
        _update: &InboundUpdate,
        _response: &HandlerResponse,
    ) -> crate::error::Result<()> {
        Ok(())
    }
}

/// Cross-cutting step wrapped around all handlers (logging, filtering).
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Return false to drop the update before any handler runs.
    async fn before(&self, update: &InboundUpdate) -> crate::error::Result<bool>;
    async fn after(
        &self,
        _update: &InboundUpdate,
        _response: &HandlerResponse,
    ) -> crate::error::Result<()> {
        Ok(())
    }
}
