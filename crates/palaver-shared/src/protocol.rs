use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Presence;

/// Events the client emits over the channel.
///
/// Encoded as `{"event": "<name>", "data": {...}}` text frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A private message to the active peer
    PrivateMessage(PrivateMessage),
    /// The local user is typing
    Typing(Typing),
}

/// Events the server delivers over the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Greeting text sent once per connection
    Welcome(String),
    /// A message addressed to or sent by this user
    NewMessage(InboundMessage),
    /// The peer is composing
    UserTyping(Typing),
    /// Acknowledgement of a `private_message`, keyed by its temp id
    MessageSent(SendAck),
    /// The peer read a message
    MessageRead(ReadReceipt),
    /// Presence change for some user
    UserStatus(StatusUpdate),
}

/// Outbound private message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    pub recipient_id: String,
    pub message: String,
    pub sender_id: String,
    pub temp_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Typing indicator, used in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    pub recipient_id: String,
    pub sender_id: String,
}

/// A message delivered by the server. The id may be missing for echoes of
/// not-yet-persisted messages; dedup then falls back to sender + timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    pub message: String,
    pub sender_id: String,
    pub recipient_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Acknowledgement mapping a temp id to its durable server id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAck {
    pub temp_id: String,
    pub message_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Read receipt for a durable message id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: String,
}

/// Presence update for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub user_id: String,
    pub status: Presence,
}

/// Event names this client understands; anything else is skipped.
const KNOWN_SERVER_EVENTS: [&str; 6] = [
    "welcome",
    "new_message",
    "user_typing",
    "message_sent",
    "message_read",
    "user_status",
];

#[derive(Deserialize)]
struct Envelope {
    event: String,
}

impl ServerEvent {
    /// Decode a text frame. `Ok(None)` means a well-formed frame carrying an
    /// event name this client does not handle.
    pub fn from_text(text: &str) -> Result<Option<Self>, serde_json::Error> {
        let envelope: Envelope = serde_json::from_str(text)?;
        if !KNOWN_SERVER_EVENTS.contains(&envelope.event.as_str()) {
            return Ok(None);
        }
        serde_json::from_str(text).map(Some)
    }
}

impl ClientEvent {
    /// Encode to a text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
