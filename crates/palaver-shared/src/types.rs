use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::TEMP_ID_PREFIX;

/// A user profile as the backend returns it.
///
/// Cached client-side after the first successful fetch; never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl UserProfile {
    /// Avatar string, falling back to the upper-cased first letter of the
    /// display name when none is set.
    pub fn avatar_or_initial(&self) -> String {
        match self.avatar.as_deref() {
            Some(a) if !a.is_empty() => a.to_string(),
            _ => self
                .name
                .chars()
                .next()
                .map(|c| c.to_uppercase().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Peer presence as reported by `user_status` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

/// Lifecycle of a single chat message bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Optimistic local entry, acknowledgement pending.
    Sending,
    /// Acknowledged by the server with a durable id.
    Sent,
    /// Delivered from the peer.
    Received,
    /// Read receipt processed.
    Read,
    /// No acknowledgement within the timeout window.
    Failed,
    /// Locally generated notice (e.g. the channel welcome).
    System,
}

/// A message in the active conversation's in-memory list.
///
/// `id` is a temp id (`temp-<millis>-<rand>`) until the server acknowledges
/// the send, after which it is the durable server id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub sender_id: String,
    #[serde(default)]
    pub recipient_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

impl ChatMessage {
    pub fn is_temp(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

/// Generate a fresh temporary message id for an optimistic send.
pub fn new_temp_id(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{}{}-{}", TEMP_ID_PREFIX, now.timestamp_millis(), suffix)
}

/// Deduplication key for an inbound message: the server id when present,
/// otherwise a composite of sender and timestamp.
pub fn dedup_key(id: Option<&str>, sender_id: &str, timestamp: DateTime<Utc>) -> String {
    match id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("{}:{}", sender_id, timestamp.timestamp_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_id_shape() {
        let id = new_temp_id(Utc::now());
        assert!(id.starts_with(TEMP_ID_PREFIX));
        assert_eq!(id.matches('-').count(), 2);
    }

    #[test]
    fn test_dedup_key_prefers_server_id() {
        let ts = Utc::now();
        assert_eq!(dedup_key(Some("abc"), "u1", ts), "abc");
        assert_eq!(
            dedup_key(None, "u1", ts),
            format!("u1:{}", ts.timestamp_millis())
        );
        // An empty id falls back to the composite as well.
        assert_eq!(
            dedup_key(Some(""), "u1", ts),
            format!("u1:{}", ts.timestamp_millis())
        );
    }

    #[test]
    fn test_avatar_fallback() {
        let profile = UserProfile {
            id: "1".into(),
            name: "alice".into(),
            email: "alice@example.com".into(),
            avatar: None,
            username: Some("alice".into()),
        };
        assert_eq!(profile.avatar_or_initial(), "A");
    }

    #[test]
    fn test_profile_accepts_mongo_style_id() {
        let profile: UserProfile = serde_json::from_str(
            r#"{"_id":"64f","name":"Bob","email":"bob@example.com"}"#,
        )
        .unwrap();
        assert_eq!(profile.id, "64f");
        assert!(profile.avatar.is_none());
    }
}
