//! Telegram Bot API contract as seen by the desk: one RPC call, one normalized answer.
//!
//! [`TelegramApi`] is transport-agnostic; desk-telegram implements it over HTTP and tests use
//! scripted fakes. Errors never surface as `Err`: every outcome, including network failure, is an
//! [`ApiResponse`] the caller classifies.

use async_trait::async_trait;
use serde_json::Value;

/// Classified failure reason, derived from the HTTP code and the API description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorType {
    TopicNotFound,
    TopicDeleted,
    TopicClosed,
    /// Entity parsing failed for the requested parse mode.
    MarkdownError,
    /// Edit or delete target does not exist anymore.
    MessageNotFound,
    NotModified,
    ChatNotFound,
    /// Unknown, expired or oversized file id.
    FileError,
    Network,
    Other,
}

impl ApiErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorType::TopicNotFound => "TOPIC_NOT_FOUND",
            ApiErrorType::TopicDeleted => "TOPIC_DELETED",
            ApiErrorType::TopicClosed => "TOPIC_CLOSED",
            ApiErrorType::MarkdownError => "MARKDOWN_ERROR",
            ApiErrorType::MessageNotFound => "MESSAGE_NOT_FOUND",
            ApiErrorType::NotModified => "NOT_MODIFIED",
            ApiErrorType::ChatNotFound => "CHAT_NOT_FOUND",
            ApiErrorType::FileError => "FILE_ERROR",
            ApiErrorType::Network => "NETWORK_ERROR",
            ApiErrorType::Other => "OTHER",
        }
    }

    /// Maps a Bot API error description to a type.
    pub fn classify(description: &str) -> Self {
        let lower = description.to_lowercase();
        if lower.contains("topic_deleted") {
            ApiErrorType::TopicDeleted
        } else if lower.contains("message thread not found") || lower.contains("topic_not_found") {
            ApiErrorType::TopicNotFound
        } else if lower.contains("topic_closed") {
            ApiErrorType::TopicClosed
        } else if lower.contains("can't parse entities") || lower.contains("can't find end of") {
            ApiErrorType::MarkdownError
        } else if lower.contains("message to edit not found")
            || lower.contains("message to delete not found")
            || lower.contains("message_id_invalid")
        {
            ApiErrorType::MessageNotFound
        } else if lower.contains("not modified") {
            ApiErrorType::NotModified
        } else if lower.contains("chat not found") {
            ApiErrorType::ChatNotFound
        } else if lower.contains("wrong file identifier")
            || lower.contains("file not found")
            || lower.contains("file is too big")
            || lower.contains("bad request: file")
        {
            ApiErrorType::FileError
        } else {
            ApiErrorType::Other
        }
    }
}

/// Normalized answer of one Bot API call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub ok: bool,
    /// HTTP-level error code from the API body (`200` on success, `0` when the request never completed).
    pub code: u16,
    pub type_error: Option<ApiErrorType>,
    pub description: Option<String>,
    /// `result.message_id` when the call produced a message.
    pub message_id: Option<i64>,
    /// `result.message_thread_id` (forum topic id) when present.
    pub message_thread_id: Option<i64>,
    /// `parameters.retry_after` on 429 answers.
    pub retry_after: Option<u64>,
    pub raw: Value,
}

impl ApiResponse {
    /// Builds a response from a decoded Bot API body (`{ok, result}` or `{ok, error_code, description, parameters}`).
    pub fn from_body(http_status: u16, body: Value) -> Self {
        let ok = body.get("ok").and_then(Value::as_bool).unwrap_or(false);
        if ok {
            let result = body.get("result");
            return Self {
                ok: true,
                code: 200,
                type_error: None,
                description: None,
                message_id: result.and_then(|r| r.get("message_id")).and_then(Value::as_i64),
                message_thread_id: result
                    .and_then(|r| r.get("message_thread_id"))
                    .and_then(Value::as_i64),
                retry_after: None,
                raw: body,
            };
        }

        let code = body
            .get("error_code")
            .and_then(Value::as_u64)
            .map(|c| c as u16)
            .unwrap_or(http_status);
        let description = body
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let retry_after = body
            .get("parameters")
            .and_then(|p| p.get("retry_after"))
            .and_then(Value::as_u64);
        let type_error = Some(
            description
                .as_deref()
                .map(ApiErrorType::classify)
                .unwrap_or(ApiErrorType::Other),
        );
        Self {
            ok: false,
            code,
            type_error,
            description,
            message_id: None,
            message_thread_id: None,
            retry_after,
            raw: body,
        }
    }

    /// Successful answer with the given `result` object.
    pub fn success(result: Value) -> Self {
        Self::from_body(200, serde_json::json!({ "ok": true, "result": result }))
    }

    /// Failed answer as the API would report it.
    pub fn failure(code: u16, description: &str) -> Self {
        Self::from_body(
            code,
            serde_json::json!({ "ok": false, "error_code": code, "description": description }),
        )
    }

    /// 429 answer carrying `retry_after`.
    pub fn rate_limited(retry_after: u64) -> Self {
        Self::from_body(
            429,
            serde_json::json!({
                "ok": false,
                "error_code": 429,
                "description": format!("Too Many Requests: retry after {}", retry_after),
                "parameters": { "retry_after": retry_after }
            }),
        )
    }

    /// The request never got an answer (connect, timeout, undecodable body).
    pub fn network_error(description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            ok: false,
            code: 0,
            type_error: Some(ApiErrorType::Network),
            raw: serde_json::json!({ "ok": false, "description": description }),
            description: Some(description),
            message_id: None,
            message_thread_id: None,
            retry_after: None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.code == 429
    }

    pub fn is_forbidden(&self) -> bool {
        self.code == 403
    }

    /// Topic was removed upstream (`TOPIC_NOT_FOUND` / `TOPIC_DELETED`).
    pub fn is_topic_missing(&self) -> bool {
        self.code == 400
            && matches!(
                self.type_error,
                Some(ApiErrorType::TopicNotFound) | Some(ApiErrorType::TopicDeleted)
            )
    }

    pub fn has_error(&self, kind: ApiErrorType) -> bool {
        self.type_error == Some(kind)
    }

    /// `result` object of a successful call.
    pub fn result(&self) -> Option<&Value> {
        self.raw.get("result")
    }
}

/// Black-box Bot API RPC: `send_query(method, params)`.
#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn send_query(&self, method: &str, params: Value) -> ApiResponse;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_extracts_ids() {
        let resp = ApiResponse::success(json!({ "message_id": 77, "message_thread_id": 12 }));
        assert!(resp.ok);
        assert_eq!(resp.message_id, Some(77));
        assert_eq!(resp.message_thread_id, Some(12));
    }

    #[test]
    fn test_create_topic_result_has_thread_id() {
        let resp = ApiResponse::success(json!({ "message_thread_id": 501, "name": "#1", "icon_color": 0 }));
        assert_eq!(resp.message_thread_id, Some(501));
        assert_eq!(resp.message_id, None);
    }

    #[test]
    fn test_topic_missing_classification() {
        let resp = ApiResponse::failure(400, "Bad Request: message thread not found");
        assert!(resp.is_topic_missing());
        let resp = ApiResponse::failure(400, "Bad Request: TOPIC_DELETED");
        assert!(resp.is_topic_missing());
        let resp = ApiResponse::failure(400, "Bad Request: TOPIC_CLOSED");
        assert!(!resp.is_topic_missing());
        assert!(resp.has_error(ApiErrorType::TopicClosed));
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let resp = ApiResponse::rate_limited(14);
        assert!(resp.is_rate_limited());
        assert_eq!(resp.retry_after, Some(14));
    }

    #[test]
    fn test_classify_descriptions() {
        assert_eq!(
            ApiErrorType::classify("Bad Request: can't parse entities: Unsupported start tag"),
            ApiErrorType::MarkdownError
        );
        assert_eq!(
            ApiErrorType::classify("Bad Request: message to edit not found"),
            ApiErrorType::MessageNotFound
        );
        assert_eq!(
            ApiErrorType::classify("Bad Request: wrong file identifier/HTTP URL specified"),
            ApiErrorType::FileError
        );
        assert_eq!(ApiErrorType::classify("Bad Request: chat not found"), ApiErrorType::ChatNotFound);
        assert_eq!(
            ApiErrorType::classify("Forbidden: bot was blocked by the user"),
            ApiErrorType::Other
        );
    }

    #[test]
    fn test_network_error_shape() {
        let resp = ApiResponse::network_error("connection refused");
        assert!(!resp.ok);
        assert_eq!(resp.code, 0);
        assert!(resp.has_error(ApiErrorType::Network));
    }
}
