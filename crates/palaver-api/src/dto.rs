//! Response payloads and the envelope-unwrapping helpers.
//!
//! The backend is inconsistent about nesting: some deployments answer with
//! the payload at the top level, some wrap it in `data`, user lookups may
//! wrap in `user`. The helpers here try the known shapes in order.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use palaver_shared::types::{MessageStatus, UserProfile};

/// A stored message as conversation pages return it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    #[serde(alias = "_id")]
    pub id: String,
    pub message: String,
    pub sender_id: String,
    pub recipient_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<MessageStatus>,
}

/// One page of conversation history, newest first.
#[derive(Debug, Clone, Default)]
pub struct ConversationPage {
    pub messages: Vec<HistoryMessage>,
    /// Total page count, when the server reports one.
    pub total_pages: Option<u32>,
}

/// Token pair as the refresh endpoint returns it. A missing refresh token
/// means the stored one stays valid.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

pub(crate) fn unwrap_user(body: &Value) -> Result<UserProfile, serde_json::Error> {
    let node = body
        .get("user")
        .or_else(|| body.get("data").and_then(|d| d.get("user")))
        .unwrap_or(body);
    serde_json::from_value(node.clone())
}

pub(crate) fn unwrap_page(body: &Value) -> Result<ConversationPage, serde_json::Error> {
    let root = match body.get("data") {
        Some(data) if data.get("result").is_some() => data,
        _ => body,
    };

    let messages = match root.get("result") {
        Some(result) => serde_json::from_value(result.clone())?,
        None => Vec::new(),
    };
    let total_pages = root
        .get("total_pages")
        .or_else(|| root.get("totalPages"))
        .and_then(Value::as_u64)
        .map(|n| n as u32);

    Ok(ConversationPage {
        messages,
        total_pages,
    })
}

pub(crate) fn unwrap_tokens(body: &Value) -> Result<TokenPair, serde_json::Error> {
    let node = body.get("data").unwrap_or(body);
    serde_json::from_value(node.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_user_shapes() {
        let profile = json!({"_id": "u1", "name": "Alice", "email": "a@x.io"});

        for body in [
            json!({"user": profile}),
            json!({"data": {"user": profile}}),
            profile.clone(),
        ] {
            let user = unwrap_user(&body).unwrap();
            assert_eq!(user.id, "u1");
        }
    }

    #[test]
    fn test_unwrap_page_shapes() {
        let msg = json!({
            "_id": "m1",
            "message": "hi",
            "senderId": "u1",
            "recipientId": "u2",
            "conversationId": "c1",
            "timestamp": "2025-01-01T00:00:00Z",
            "status": "sent"
        });

        let flat = unwrap_page(&json!({"result": [msg], "total_pages": 3})).unwrap();
        assert_eq!(flat.messages.len(), 1);
        assert_eq!(flat.total_pages, Some(3));
        assert_eq!(flat.messages[0].status, Some(MessageStatus::Sent));

        let nested = unwrap_page(&json!({"data": {"result": [msg]}})).unwrap();
        assert_eq!(nested.messages.len(), 1);
        assert_eq!(nested.total_pages, None);

        let empty = unwrap_page(&json!({"message": "no conversation"})).unwrap();
        assert!(empty.messages.is_empty());
    }

    #[test]
    fn test_unwrap_tokens_optional_refresh() {
        let pair = unwrap_tokens(&json!({"data": {"access_token": "a2"}})).unwrap();
        assert_eq!(pair.access_token, "a2");
        assert!(pair.refresh_token.is_none());

        let pair =
            unwrap_tokens(&json!({"access_token": "a2", "refresh_token": "r2"})).unwrap();
        assert_eq!(pair.refresh_token.as_deref(), Some("r2"));
    }
}
