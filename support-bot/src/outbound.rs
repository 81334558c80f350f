//! Outbound message descriptor: Bot API method + content params, addressed per recipient.
//!
//! Content never carries chat addressing, so one descriptor can be re-addressed for every
//! broadcast recipient or resent after a topic is recreated.

use desk_core::{InboundUpdate, MediaKind, MessageEntity};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::formatting::{entities_to_html, truncate_chars};
use crate::messages;

/// Telegram caption limit.
pub const MAX_CAPTION_LENGTH: usize = 1024;

const CUSTOMER_MEDIA: &[MediaKind] = &[
    MediaKind::Photo,
    MediaKind::Document,
    MediaKind::Voice,
    MediaKind::Sticker,
    MediaKind::VideoNote,
];

const MANAGER_MEDIA: &[MediaKind] = &[
    MediaKind::Photo,
    MediaKind::Document,
    MediaKind::Audio,
    MediaKind::Video,
    MediaKind::Voice,
    MediaKind::VideoNote,
    MediaKind::Sticker,
];

const BROADCAST_MEDIA: &[MediaKind] = &[
    MediaKind::Photo,
    MediaKind::Document,
    MediaKind::Audio,
    MediaKind::Video,
    MediaKind::Voice,
    MediaKind::VideoNote,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub method: String,
    pub params: Map<String, Value>,
    /// Alternate params for a rejected parse mode: raw text with its entities, no parse mode.
    pub fallback: Option<Map<String, Value>>,
    /// Message log type (`text`, `photo`, `location`, ...).
    pub message_type: String,
    /// Text or caption for the message log.
    pub content: String,
}

impl OutboundMessage {
    fn new(method: &str, message_type: &str) -> Self {
        Self {
            method: method.to_string(),
            params: Map::new(),
            fallback: None,
            message_type: message_type.to_string(),
            content: String::new(),
        }
    }

    /// Plain `sendMessage`.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut message = Self::new("sendMessage", "text");
        message.params.insert("text".into(), json!(text));
        message.content = text;
        message
    }

    /// `sendMessage` with `parse_mode=HTML`; the caller escapes the text.
    pub fn html(text: impl Into<String>) -> Self {
        let mut message = Self::text(text);
        message.params.insert("parse_mode".into(), json!("HTML"));
        message
    }

    pub fn with_reply_markup(mut self, markup: Value) -> Self {
        if let Some(fallback) = self.fallback.as_mut() {
            fallback.insert("reply_markup".into(), markup.clone());
        }
        self.params.insert("reply_markup".into(), markup);
        self
    }

    /// Customer → topic: photo, document, location, voice, sticker, video note, contact, text.
    pub fn from_customer_update(update: &InboundUpdate) -> Option<Self> {
        if let Some(media) = update.first_media(&CUSTOMER_MEDIA[..2]) {
            return Some(Self::media(media.kind, &media.file_id, update, None));
        }
        if let Some(location) = update.location {
            let mut message = Self::new("sendLocation", "location");
            message.params.insert("latitude".into(), json!(location.latitude));
            message.params.insert("longitude".into(), json!(location.longitude));
            message.content = format!("{}, {}", location.latitude, location.longitude);
            return Some(message);
        }
        if let Some(media) = update.first_media(&CUSTOMER_MEDIA[2..]) {
            return Some(Self::media(media.kind, &media.file_id, update, None));
        }
        if let Some(contact) = &update.contact {
            let name = [contact.first_name.as_deref(), contact.last_name.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            let mut message =
                Self::text(messages::contact_forwarded(&name, &contact.phone_number));
            message.message_type = "contact".to_string();
            return Some(message);
        }
        update.text().map(|text| Self::rich_text(text, &update.entities))
    }

    /// Topic → customer: photo, document, audio, video, voice, video note, sticker, location, text.
    pub fn from_manager_update(update: &InboundUpdate) -> Option<Self> {
        if let Some(media) = update.first_media(MANAGER_MEDIA) {
            return Some(Self::media(media.kind, &media.file_id, update, None));
        }
        if let Some(location) = update.location {
            let mut message = Self::new("sendLocation", "location");
            message.params.insert("latitude".into(), json!(location.latitude));
            message.params.insert("longitude".into(), json!(location.longitude));
            message.content = format!("{}, {}", location.latitude, location.longitude);
            return Some(message);
        }
        update.text().map(|text| Self::rich_text(text, &update.entities))
    }

    /// Broadcast copy: photo, document, audio, video, voice, video note, text. No forward or
    /// reply attribution is carried over; captions are cut to [`MAX_CAPTION_LENGTH`].
    pub fn for_broadcast(update: &InboundUpdate) -> Option<Self> {
        if let Some(media) = update.first_media(BROADCAST_MEDIA) {
            return Some(Self::media(
                media.kind,
                &media.file_id,
                update,
                Some(MAX_CAPTION_LENGTH),
            ));
        }
        update.text().map(|text| Self::rich_text(text, &update.entities))
    }

    fn rich_text(text: &str, entities: &[MessageEntity]) -> Self {
        let mut message = Self::new("sendMessage", "text");
        message.content = text.to_string();
        if entities.is_empty() {
            message.params.insert("text".into(), json!(text));
            return message;
        }
        message
            .params
            .insert("text".into(), json!(entities_to_html(text, entities)));
        message.params.insert("parse_mode".into(), json!("HTML"));
        let mut fallback = Map::new();
        fallback.insert("text".into(), json!(text));
        fallback.insert("entities".into(), json!(entities));
        message.fallback = Some(fallback);
        message
    }

    fn media(
        kind: MediaKind,
        file_id: &str,
        update: &InboundUpdate,
        caption_limit: Option<usize>,
    ) -> Self {
        let mut message = Self::new(kind.send_method(), kind.as_str());
        message.params.insert(kind.param_name().into(), json!(file_id));
        let caption = update.caption.as_deref().filter(|c| !c.is_empty());
        let Some(caption) = caption.filter(|_| kind.accepts_caption()) else {
            return message;
        };

        let caption = match caption_limit {
            Some(limit) => truncate_chars(caption, limit),
            None => caption.to_string(),
        };
        let caption_units = caption.encode_utf16().count();
        let entities: Vec<MessageEntity> = update
            .entities
            .iter()
            .filter(|e| e.offset + e.length <= caption_units)
            .cloned()
            .collect();

        message.content = caption.clone();
        if entities.is_empty() {
            message.params.insert("caption".into(), json!(caption));
            return message;
        }
        message
            .params
            .insert("caption".into(), json!(entities_to_html(&caption, &entities)));
        message.params.insert("parse_mode".into(), json!("HTML"));
        let mut fallback = message.params.clone();
        fallback.remove("parse_mode");
        fallback.insert("caption".into(), json!(caption));
        fallback.insert("caption_entities".into(), json!(entities));
        message.fallback = Some(fallback);
        message
    }

    /// Switches to the alternate params. False when there is none left.
    pub fn fall_back_to_plain(&mut self) -> bool {
        match self.fallback.take() {
            Some(fallback) => {
                self.params = fallback;
                true
            }
            None => false,
        }
    }

    /// Request params addressed to `chat_id` (and a forum topic, when given).
    pub fn params_for(&self, chat_id: i64, thread_id: Option<i64>) -> Value {
        let mut params = self.params.clone();
        params.insert("chat_id".into(), json!(chat_id));
        if let Some(thread_id) = thread_id {
            params.insert("message_thread_id".into(), json!(thread_id));
        }
        Value::Object(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_core::{ContactPayload, Location, MediaFile, SourceType, UpdateKind};

    fn update() -> InboundUpdate {
        let mut update = InboundUpdate::new(1, UpdateKind::Message, SourceType::Private, 10);
        update.message_id = Some(5);
        update
    }

    fn bold(offset: usize, length: usize) -> MessageEntity {
        MessageEntity {
            kind: "bold".into(),
            offset,
            length,
            url: None,
            language: None,
            custom_emoji_id: None,
        }
    }

    #[test]
    fn test_plain_text_has_no_fallback() {
        let mut u = update();
        u.text = Some("hello".into());
        let message = OutboundMessage::from_customer_update(&u).unwrap();
        assert_eq!(message.method, "sendMessage");
        assert_eq!(message.params["text"], "hello");
        assert!(message.fallback.is_none());
    }

    #[test]
    fn test_entities_render_html_with_raw_fallback() {
        let mut u = update();
        u.text = Some("hi <all>".into());
        u.entities = vec![bold(0, 2)];
        let mut message = OutboundMessage::from_customer_update(&u).unwrap();
        assert_eq!(message.params["text"], "<b>hi</b> &lt;all&gt;");
        assert_eq!(message.params["parse_mode"], "HTML");

        assert!(message.fall_back_to_plain());
        assert_eq!(message.params["text"], "hi <all>");
        assert!(message.params.get("parse_mode").is_none());
        assert_eq!(message.params["entities"][0]["type"], "bold");
        assert!(!message.fall_back_to_plain());
    }

    #[test]
    fn test_customer_priority_photo_over_location_and_text() {
        let mut u = update();
        u.text = Some("ignored".into());
        u.location = Some(Location {
            latitude: 1.0,
            longitude: 2.0,
        });
        u.media = vec![MediaFile {
            kind: MediaKind::Photo,
            file_id: "p".into(),
        }];
        u.caption = Some("look".into());
        let message = OutboundMessage::from_customer_update(&u).unwrap();
        assert_eq!(message.method, "sendPhoto");
        assert_eq!(message.params["photo"], "p");
        assert_eq!(message.params["caption"], "look");

        u.media.clear();
        let message = OutboundMessage::from_customer_update(&u).unwrap();
        assert_eq!(message.method, "sendLocation");
    }

    #[test]
    fn test_customer_contact_becomes_text() {
        let mut u = update();
        u.contact = Some(ContactPayload {
            phone_number: "+375291112233".into(),
            first_name: Some("Ann".into()),
            last_name: None,
            user_id: Some(10),
        });
        let message = OutboundMessage::from_customer_update(&u).unwrap();
        assert_eq!(message.message_type, "contact");
        assert_eq!(message.params["text"], "Contact:\nName: Ann\nPhone: +375291112233");
    }

    #[test]
    fn test_broadcast_caption_truncated_and_video_note_drops_caption() {
        let mut u = update();
        u.media = vec![MediaFile {
            kind: MediaKind::Video,
            file_id: "v".into(),
        }];
        u.caption = Some("x".repeat(1500));
        let message = OutboundMessage::for_broadcast(&u).unwrap();
        assert_eq!(
            message.params["caption"].as_str().unwrap().chars().count(),
            MAX_CAPTION_LENGTH
        );

        u.media = vec![MediaFile {
            kind: MediaKind::VideoNote,
            file_id: "n".into(),
        }];
        let message = OutboundMessage::for_broadcast(&u).unwrap();
        assert_eq!(message.method, "sendVideoNote");
        assert!(message.params.get("caption").is_none());
    }

    #[test]
    fn test_broadcast_ignores_stickers_and_empty_updates() {
        let mut u = update();
        u.media = vec![MediaFile {
            kind: MediaKind::Sticker,
            file_id: "s".into(),
        }];
        assert!(OutboundMessage::for_broadcast(&u).is_none());
        assert!(OutboundMessage::for_broadcast(&update()).is_none());
    }

    #[test]
    fn test_params_for_adds_addressing() {
        let message = OutboundMessage::text("hi");
        let params = message.params_for(-100, Some(7));
        assert_eq!(params["chat_id"], -100);
        assert_eq!(params["message_thread_id"], 7);
        assert!(message.params_for(5, None).get("message_thread_id").is_none());
    }
}
