//! Webhook JSON → [`InboundUpdate`].
//!
//! Only the fields the desk reads are modelled; the full payload is kept in `raw`.

use chrono::{TimeZone, Utc};
use desk_core::{
    CallbackQuery, ContactPayload, InboundUpdate, Location, MediaFile, MediaKind, MessageEntity,
    SourceType, UpdateKind, User,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<RawMessage>,
    edited_message: Option<RawMessage>,
    callback_query: Option<RawCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
}

impl From<RawUser> for User {
    fn from(u: RawUser) -> Self {
        User {
            id: u.id,
            is_bot: u.is_bot,
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RawPhotoSize {
    file_id: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct RawContact {
    phone_number: String,
    first_name: Option<String>,
    last_name: Option<String>,
    user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct RawTopicEdited {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessageRef {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    message_id: i64,
    message_thread_id: Option<i64>,
    date: Option<i64>,
    from: Option<RawUser>,
    chat: RawChat,
    text: Option<String>,
    caption: Option<String>,
    #[serde(default)]
    entities: Vec<MessageEntity>,
    #[serde(default)]
    caption_entities: Vec<MessageEntity>,
    #[serde(default)]
    photo: Vec<RawPhotoSize>,
    document: Option<RawFile>,
    audio: Option<RawFile>,
    video: Option<RawFile>,
    voice: Option<RawFile>,
    video_note: Option<RawFile>,
    sticker: Option<RawFile>,
    contact: Option<RawContact>,
    location: Option<RawLocation>,
    media_group_id: Option<String>,
    reply_to_message: Option<RawMessageRef>,
    forum_topic_edited: Option<RawTopicEdited>,
    pinned_message: Option<Value>,
    forward_origin: Option<Value>,
    forward_from: Option<Value>,
    forward_from_chat: Option<Value>,
    forward_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawCallbackQuery {
    id: String,
    from: RawUser,
    message: Option<RawMessage>,
    data: Option<String>,
}

/// Parses a Bot API `Update` object.
///
/// Updates without a message or callback (polls, chat member changes, ...) come back as
/// [`UpdateKind::Other`] with `chat_id` 0.
pub fn parse_update(raw: Value) -> Result<InboundUpdate, serde_json::Error> {
    let parsed: RawUpdate = serde_json::from_value(raw.clone())?;

    let mut update = if let Some(message) = parsed.message {
        message_update(parsed.update_id, UpdateKind::Message, message)
    } else if let Some(message) = parsed.edited_message {
        let mut update = message_update(parsed.update_id, UpdateKind::EditedMessage, message);
        update.is_edited = true;
        update
    } else if let Some(callback) = parsed.callback_query {
        callback_update(parsed.update_id, callback)
    } else {
        InboundUpdate::new(parsed.update_id, UpdateKind::Other, SourceType::Unknown, 0)
    };

    update.raw = raw;
    Ok(update)
}

fn message_update(update_id: i64, kind: UpdateKind, message: RawMessage) -> InboundUpdate {
    let mut update = InboundUpdate::new(
        update_id,
        kind,
        SourceType::from_chat_type(&message.chat.kind),
        message.chat.id,
    );
    update.message_id = Some(message.message_id);
    update.thread_id = message.message_thread_id;
    if let Some(received_at) = message.date.and_then(|d| Utc.timestamp_opt(d, 0).single()) {
        update.received_at = received_at;
    }
    update.from = message.from.map(User::from);
    update.text = message.text;
    update.caption = message.caption;
    update.entities = if update.text.is_some() {
        message.entities
    } else {
        message.caption_entities
    };

    // Telegram lists photo sizes smallest first, but the order is not guaranteed.
    if let Some(largest) = message
        .photo
        .into_iter()
        .max_by_key(|p| u64::from(p.width) * u64::from(p.height))
    {
        update.media.push(MediaFile {
            kind: MediaKind::Photo,
            file_id: largest.file_id,
        });
    }
    let files = [
        (MediaKind::Document, message.document),
        (MediaKind::Audio, message.audio),
        (MediaKind::Video, message.video),
        (MediaKind::Voice, message.voice),
        (MediaKind::VideoNote, message.video_note),
        (MediaKind::Sticker, message.sticker),
    ];
    for (kind, file) in files {
        if let Some(file) = file {
            update.media.push(MediaFile {
                kind,
                file_id: file.file_id,
            });
        }
    }

    update.contact = message.contact.map(|c| ContactPayload {
        phone_number: c.phone_number,
        first_name: c.first_name,
        last_name: c.last_name,
        user_id: c.user_id,
    });
    update.location = message.location.map(|l| Location {
        latitude: l.latitude,
        longitude: l.longitude,
    });
    update.media_group_id = message.media_group_id;
    update.reply_to_message_id = message.reply_to_message.map(|r| r.message_id);
    update.topic_edited_name = message
        .forum_topic_edited
        .and_then(|e| e.name)
        .filter(|n| !n.trim().is_empty());
    update.is_pinned = message.pinned_message.is_some();
    update.is_forwarded = message.forward_origin.is_some()
        || message.forward_from.is_some()
        || message.forward_from_chat.is_some()
        || message.forward_date.is_some();
    update
}

fn callback_update(update_id: i64, callback: RawCallbackQuery) -> InboundUpdate {
    let (source, chat_id, message_id, thread_id) = match &callback.message {
        Some(m) => (
            SourceType::from_chat_type(&m.chat.kind),
            m.chat.id,
            Some(m.message_id),
            m.message_thread_id,
        ),
        None => (SourceType::Unknown, callback.from.id, None, None),
    };
    let mut update = InboundUpdate::new(update_id, UpdateKind::CallbackQuery, source, chat_id);
    update.message_id = message_id;
    update.thread_id = thread_id;
    update.callback = Some(CallbackQuery {
        id: callback.id,
        data: callback.data.unwrap_or_default(),
    });
    update.from = Some(User::from(callback.from));
    update
}
