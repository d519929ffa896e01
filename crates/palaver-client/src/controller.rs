//! In-memory state of one private conversation.
//!
//! [`ChatController`] is purely synchronous: the async session loop feeds it
//! server events and clock readings and emits whatever payloads it returns.
//! That keeps every reconciliation rule testable with synthetic events.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use palaver_api::dto::ConversationPage;
use palaver_shared::constants::{SEND_ACK_TIMEOUT_SECS, TYPING_QUIET_MILLIS};
use palaver_shared::protocol::{
    InboundMessage, PrivateMessage, ReadReceipt, SendAck, ServerEvent, StatusUpdate, Typing,
};
use palaver_shared::types::{
    dedup_key, new_temp_id, ChatMessage, MessageStatus, Presence, UserProfile,
};

/// The peer this session is attached to.
#[derive(Debug, Clone)]
pub struct Peer {
    pub profile: UserProfile,
    pub presence: Presence,
}

#[derive(Debug)]
pub struct ChatController {
    me: UserProfile,
    peer: Peer,
    connected: bool,
    conversation_id: Option<String>,
    /// Oldest-to-newest; sends append, history pages prepend.
    messages: Vec<ChatMessage>,
    /// Every message id seen for this conversation, temp ids included.
    seen_ids: HashSet<String>,
    /// Unacknowledged sends: temp id and failure deadline.
    pending_sends: Vec<(String, DateTime<Utc>)>,
    /// The peer-typing flag clears at this instant.
    typing_until: Option<DateTime<Utc>>,
    next_page: u32,
    history_exhausted: bool,
    page_size: u32,
}

impl ChatController {
    pub fn new(me: UserProfile, peer: UserProfile, page_size: u32) -> Self {
        Self {
            me,
            peer: Peer {
                profile: peer,
                presence: Presence::Offline,
            },
            connected: false,
            conversation_id: None,
            messages: Vec::new(),
            seen_ids: HashSet::new(),
            pending_sends: Vec::new(),
            typing_until: None,
            next_page: 1,
            history_exhausted: false,
            page_size,
        }
    }

    pub fn me(&self) -> &UserProfile {
        &self.me
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, up: bool) {
        self.connected = up;
    }

    pub fn is_peer_typing(&self, now: DateTime<Utc>) -> bool {
        self.typing_until.is_some_and(|until| now < until)
    }

    pub fn history_exhausted(&self) -> bool {
        self.history_exhausted
    }

    /// Page number the next "load more" should request.
    pub fn next_page(&self) -> u32 {
        self.next_page
    }

    // -- History -----------------------------------------------------------

    /// Merge one server page (newest first) into the list, deduplicated and
    /// prepended older-before-newer. Returns how many messages were added.
    pub fn ingest_history_page(&mut self, page: &ConversationPage) -> usize {
        if self.conversation_id.is_none() {
            if let Some(first) = page.messages.first() {
                self.conversation_id = first.conversation_id.clone();
            }
        }

        let mut block: Vec<ChatMessage> = Vec::new();
        // Reverse: the server sends newest first, the list is oldest first.
        for msg in page.messages.iter().rev() {
            if !self.seen_ids.insert(msg.id.clone()) {
                continue;
            }
            block.push(ChatMessage {
                id: msg.id.clone(),
                text: msg.message.clone(),
                sender_id: msg.sender_id.clone(),
                recipient_id: Some(msg.recipient_id.clone()),
                timestamp: msg.timestamp,
                status: msg.status.unwrap_or(MessageStatus::Sent),
            });
        }

        let added = block.len();
        self.messages.splice(0..0, block);

        let count = page.messages.len() as u32;
        if count < self.page_size {
            self.history_exhausted = true;
        }
        if let Some(total) = page.total_pages {
            if self.next_page >= total {
                self.history_exhausted = true;
            }
        }
        self.next_page += 1;

        debug!(added, exhausted = self.history_exhausted, "History page merged");
        added
    }

    // -- Inbound events ----------------------------------------------------

    pub fn handle_event(&mut self, event: ServerEvent, now: DateTime<Utc>) {
        match event {
            ServerEvent::Welcome(text) => self.on_welcome(text, now),
            ServerEvent::NewMessage(msg) => self.on_new_message(msg, now),
            ServerEvent::UserTyping(typing) => self.on_typing(typing, now),
            ServerEvent::MessageSent(ack) => self.on_ack(ack),
            ServerEvent::MessageRead(receipt) => self.on_read(receipt),
            ServerEvent::UserStatus(status) => self.on_status(status),
        }
    }

    fn on_welcome(&mut self, text: String, now: DateTime<Utc>) {
        self.messages.push(ChatMessage {
            id: format!("system-{}", Uuid::new_v4()),
            text,
            sender_id: "system".to_string(),
            recipient_id: None,
            timestamp: now,
            status: MessageStatus::System,
        });
    }

    fn on_new_message(&mut self, msg: InboundMessage, now: DateTime<Utc>) {
        let peer_id = &self.peer.profile.id;
        let mine = msg.sender_id == self.me.id && msg.recipient_id == *peer_id;
        let theirs = msg.sender_id == *peer_id && msg.recipient_id == self.me.id;
        if !mine && !theirs {
            debug!(sender = %msg.sender_id, "Message outside the active pair dropped");
            return;
        }

        let timestamp = msg.timestamp.unwrap_or(now);
        let key = dedup_key(msg.id.as_deref(), &msg.sender_id, timestamp);
        if !self.seen_ids.insert(key) {
            debug!(id = ?msg.id, "Duplicate message dropped");
            return;
        }

        if self.conversation_id.is_none() {
            self.conversation_id = msg.conversation_id.clone();
        }

        let id = msg
            .id
            .unwrap_or_else(|| format!("recv-{}", timestamp.timestamp_millis()));
        self.messages.push(ChatMessage {
            id,
            text: msg.message,
            sender_id: msg.sender_id,
            recipient_id: Some(msg.recipient_id),
            timestamp,
            status: MessageStatus::Received,
        });
    }

    fn on_typing(&mut self, typing: Typing, now: DateTime<Utc>) {
        if typing.sender_id == self.peer.profile.id {
            self.typing_until = Some(now + Duration::milliseconds(TYPING_QUIET_MILLIS));
        }
    }

    fn on_ack(&mut self, ack: SendAck) {
        if self.conversation_id.is_none() {
            self.conversation_id = ack.conversation_id.clone();
        }

        let Some(pos) = self.messages.iter().position(|m| m.id == ack.temp_id) else {
            debug!(temp_id = %ack.temp_id, "Acknowledgement for unknown temp id");
            return;
        };

        match self.messages[pos].status {
            MessageStatus::Sending => {
                self.messages[pos].id = ack.message_id.clone();
                self.messages[pos].status = MessageStatus::Sent;
                self.seen_ids.remove(&ack.temp_id);
                self.seen_ids.insert(ack.message_id);
                self.pending_sends.retain(|(id, _)| id != &ack.temp_id);
            }
            MessageStatus::Failed => {
                // Too late: the failure already surfaced. Record the durable
                // id anyway so the server's echo cannot render twice.
                info!(temp_id = %ack.temp_id, "Ignoring late acknowledgement for failed message");
                self.seen_ids.insert(ack.message_id);
            }
            _ => {
                debug!(temp_id = %ack.temp_id, "Acknowledgement for non-pending message");
            }
        }
    }

    fn on_read(&mut self, receipt: ReadReceipt) {
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == receipt.message_id) {
            msg.status = MessageStatus::Read;
        }
    }

    fn on_status(&mut self, status: StatusUpdate) {
        if status.user_id == self.peer.profile.id {
            self.peer.presence = status.status;
        }
    }

    // -- Outbound ----------------------------------------------------------

    /// Append an optimistic entry and produce the payload to emit. `None`
    /// means the send was rejected (blank input or disconnected) and nothing
    /// changed.
    pub fn compose_send(&mut self, text: &str, now: DateTime<Utc>) -> Option<PrivateMessage> {
        let text = text.trim();
        if text.is_empty() || !self.connected {
            return None;
        }

        let temp_id = new_temp_id(now);
        self.messages.push(ChatMessage {
            id: temp_id.clone(),
            text: text.to_string(),
            sender_id: self.me.id.clone(),
            recipient_id: Some(self.peer.profile.id.clone()),
            timestamp: now,
            status: MessageStatus::Sending,
        });
        self.seen_ids.insert(temp_id.clone());
        self.pending_sends.push((
            temp_id.clone(),
            now + Duration::seconds(SEND_ACK_TIMEOUT_SECS),
        ));

        Some(PrivateMessage {
            recipient_id: self.peer.profile.id.clone(),
            message: text.to_string(),
            sender_id: self.me.id.clone(),
            temp_id,
            conversation_id: self.conversation_id.clone(),
            timestamp: now,
        })
    }

    /// Payload for a typing notification, while connected.
    pub fn compose_typing(&self) -> Option<Typing> {
        if !self.connected {
            return None;
        }
        Some(Typing {
            recipient_id: self.peer.profile.id.clone(),
            sender_id: self.me.id.clone(),
        })
    }

    /// Replace a failed entry with a fresh optimistic send of the same text.
    pub fn compose_resend(&mut self, message_id: &str, now: DateTime<Utc>) -> Option<PrivateMessage> {
        let pos = self
            .messages
            .iter()
            .position(|m| m.id == message_id && m.status == MessageStatus::Failed)?;
        let failed = self.messages.remove(pos);
        self.seen_ids.remove(&failed.id);
        self.compose_send(&failed.text, now)
    }

    // -- Timers ------------------------------------------------------------

    /// Earliest instant at which [`on_tick`](Self::on_tick) has work to do.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.pending_sends
            .iter()
            .map(|(_, deadline)| *deadline)
            .chain(self.typing_until)
            .min()
    }

    /// Expire overdue state: sends past their acknowledgement window flip to
    /// `Failed` (their temp ids are returned), and a quiet peer stops typing.
    pub fn on_tick(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut failed = Vec::new();

        let (overdue, pending): (Vec<_>, Vec<_>) = self
            .pending_sends
            .drain(..)
            .partition(|(_, deadline)| *deadline <= now);
        self.pending_sends = pending;

        for (temp_id, _) in overdue {
            if let Some(msg) = self
                .messages
                .iter_mut()
                .find(|m| m.id == temp_id && m.status == MessageStatus::Sending)
            {
                msg.status = MessageStatus::Failed;
                failed.push(temp_id);
            }
        }

        if self.typing_until.is_some_and(|until| until <= now) {
            self.typing_until = None;
        }

        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_api::dto::HistoryMessage;

    fn profile(id: &str, name: &str) -> UserProfile {
        UserProfile {
            id: id.into(),
            name: name.into(),
            email: format!("{name}@example.com"),
            avatar: None,
            username: Some(name.to_lowercase()),
        }
    }

    fn controller() -> ChatController {
        ChatController::new(profile("u1", "Alice"), profile("u2", "Bob"), 3)
    }

    fn connected_controller() -> ChatController {
        let mut c = controller();
        c.set_connected(true);
        c
    }

    fn now() -> DateTime<Utc> {
        "2025-06-01T12:00:00Z".parse().unwrap()
    }

    fn history_message(id: &str, sender: &str, recipient: &str, ts_min: i64) -> HistoryMessage {
        serde_json::from_value(serde_json::json!({
            "_id": id,
            "message": format!("msg {id}"),
            "senderId": sender,
            "recipientId": recipient,
            "conversationId": "c1",
            "timestamp": (now() + Duration::minutes(ts_min)).to_rfc3339(),
            "status": "sent"
        }))
        .unwrap()
    }

    fn inbound(id: Option<&str>, sender: &str, recipient: &str) -> InboundMessage {
        InboundMessage {
            id: id.map(str::to_string),
            message: "hello".into(),
            sender_id: sender.into(),
            recipient_id: recipient.into(),
            conversation_id: Some("c1".into()),
            timestamp: Some(now()),
        }
    }

    #[test]
    fn test_optimistic_entry_appears_synchronously() {
        let mut c = connected_controller();

        let payload = c.compose_send("hi", now()).unwrap();
        assert!(payload.temp_id.starts_with("temp-"));

        let last = c.messages().last().unwrap();
        assert_eq!(last.id, payload.temp_id);
        assert_eq!(last.status, MessageStatus::Sending);
        assert_eq!(last.text, "hi");
    }

    #[test]
    fn test_send_rejected_when_disconnected_or_blank() {
        let mut c = controller();
        assert!(c.compose_send("hi", now()).is_none());
        assert!(c.messages().is_empty());

        c.set_connected(true);
        assert!(c.compose_send("   ", now()).is_none());
        assert!(c.messages().is_empty());
    }

    #[test]
    fn test_typing_emission_requires_connection() {
        let mut c = controller();
        assert!(c.compose_typing().is_none());

        c.set_connected(true);
        let typing = c.compose_typing().unwrap();
        assert_eq!(typing.recipient_id, "u2");
        assert_eq!(typing.sender_id, "u1");
    }

    #[test]
    fn test_ack_swaps_temp_id_for_durable_id() {
        let mut c = connected_controller();
        let payload = c.compose_send("hi", now()).unwrap();
        let temp_id = payload.temp_id;

        c.handle_event(
            ServerEvent::MessageSent(SendAck {
                temp_id: temp_id.clone(),
                message_id: "m1".into(),
                conversation_id: Some("c1".into()),
            }),
            now(),
        );

        let msg = c.messages().last().unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.status, MessageStatus::Sent);
        assert_eq!(c.conversation_id(), Some("c1"));
        // The dedup index must never keep an acknowledged temp id.
        assert!(!c.seen_ids.contains(&temp_id));
        assert!(c.seen_ids.contains("m1"));
        assert!(c.pending_sends.is_empty());

        // A second ack for the same temp id finds nothing to do.
        c.handle_event(
            ServerEvent::MessageSent(SendAck {
                temp_id,
                message_id: "m2".into(),
                conversation_id: None,
            }),
            now(),
        );
        assert_eq!(c.messages().len(), 1);
        assert_eq!(c.messages()[0].id, "m1");
    }

    #[test]
    fn test_timeout_flips_to_failed_only_after_window() {
        let mut c = connected_controller();
        let payload = c.compose_send("hi", now()).unwrap();

        assert!(c.on_tick(now() + Duration::seconds(9)).is_empty());
        assert_eq!(c.messages()[0].status, MessageStatus::Sending);

        let failed = c.on_tick(now() + Duration::seconds(10));
        assert_eq!(failed, vec![payload.temp_id]);
        assert_eq!(c.messages()[0].status, MessageStatus::Failed);
    }

    #[test]
    fn test_late_ack_does_not_resurrect_failed_message() {
        let mut c = connected_controller();
        let payload = c.compose_send("hi", now()).unwrap();
        c.on_tick(now() + Duration::seconds(11));
        assert_eq!(c.messages()[0].status, MessageStatus::Failed);

        c.handle_event(
            ServerEvent::MessageSent(SendAck {
                temp_id: payload.temp_id.clone(),
                message_id: "m1".into(),
                conversation_id: None,
            }),
            now() + Duration::seconds(12),
        );

        let msg = &c.messages()[0];
        assert_eq!(msg.status, MessageStatus::Failed);
        assert_eq!(msg.id, payload.temp_id);
        // The durable id is still remembered, so the echo dedups away.
        let mut echo = inbound(Some("m1"), "u1", "u2");
        echo.message = "hello".into();
        c.handle_event(ServerEvent::NewMessage(echo), now());
        assert_eq!(c.messages().len(), 1);
    }

    #[test]
    fn test_resend_failed_message() {
        let mut c = connected_controller();
        let payload = c.compose_send("hi", now()).unwrap();
        c.on_tick(now() + Duration::seconds(11));

        let resent = c
            .compose_resend(&payload.temp_id, now() + Duration::seconds(20))
            .unwrap();
        assert_ne!(resent.temp_id, payload.temp_id);
        assert_eq!(resent.message, "hi");
        assert_eq!(c.messages().len(), 1);
        assert_eq!(c.messages()[0].status, MessageStatus::Sending);
        assert!(!c.seen_ids.contains(&payload.temp_id));

        // Only failed messages are resendable.
        assert!(c.compose_resend(&resent.temp_id, now()).is_none());
    }

    #[test]
    fn test_new_message_outside_pair_is_dropped() {
        let mut c = connected_controller();
        c.handle_event(ServerEvent::NewMessage(inbound(Some("m1"), "u9", "u1")), now());
        c.handle_event(ServerEvent::NewMessage(inbound(Some("m2"), "u2", "u9")), now());
        assert!(c.messages().is_empty());

        // Both directions of the active pair are accepted.
        c.handle_event(ServerEvent::NewMessage(inbound(Some("m3"), "u2", "u1")), now());
        c.handle_event(ServerEvent::NewMessage(inbound(Some("m4"), "u1", "u2")), now());
        assert_eq!(c.messages().len(), 2);
    }

    #[test]
    fn test_new_message_dedup_by_id_and_composite() {
        let mut c = connected_controller();

        c.handle_event(ServerEvent::NewMessage(inbound(Some("m1"), "u2", "u1")), now());
        c.handle_event(ServerEvent::NewMessage(inbound(Some("m1"), "u2", "u1")), now());
        assert_eq!(c.messages().len(), 1);

        // Without a server id the sender+timestamp composite deduplicates.
        c.handle_event(ServerEvent::NewMessage(inbound(None, "u2", "u1")), now());
        c.handle_event(ServerEvent::NewMessage(inbound(None, "u2", "u1")), now());
        assert_eq!(c.messages().len(), 2);
    }

    #[test]
    fn test_conversation_id_adopted_from_first_inbound() {
        let mut c = connected_controller();
        assert!(c.conversation_id().is_none());
        c.handle_event(ServerEvent::NewMessage(inbound(Some("m1"), "u2", "u1")), now());
        assert_eq!(c.conversation_id(), Some("c1"));

        // First writer wins.
        let mut other = inbound(Some("m2"), "u2", "u1");
        other.conversation_id = Some("c9".into());
        c.handle_event(ServerEvent::NewMessage(other), now());
        assert_eq!(c.conversation_id(), Some("c1"));
    }

    #[test]
    fn test_history_pages_merge_oldest_first_without_duplicates() {
        let mut c = controller();

        // Page 1, newest first: m5 m4 m3.
        let page1 = ConversationPage {
            messages: vec![
                history_message("m5", "u2", "u1", 5),
                history_message("m4", "u1", "u2", 4),
                history_message("m3", "u2", "u1", 3),
            ],
            total_pages: None,
        };
        assert_eq!(c.ingest_history_page(&page1), 3);
        assert_eq!(c.conversation_id(), Some("c1"));
        assert!(!c.history_exhausted());
        assert_eq!(c.next_page(), 2);

        // Page 2 overlaps m3 (page drift on the server side).
        let page2 = ConversationPage {
            messages: vec![
                history_message("m3", "u2", "u1", 3),
                history_message("m2", "u1", "u2", 2),
                history_message("m1", "u2", "u1", 1),
            ],
            total_pages: None,
        };
        assert_eq!(c.ingest_history_page(&page2), 2);

        let ids: Vec<&str> = c.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3", "m4", "m5"]);
    }

    #[test]
    fn test_history_exhaustion_by_short_page_and_total_pages() {
        let mut c = controller();
        let short = ConversationPage {
            messages: vec![history_message("m1", "u2", "u1", 1)],
            total_pages: None,
        };
        c.ingest_history_page(&short);
        assert!(c.history_exhausted());

        let mut c = controller();
        let full_but_last = ConversationPage {
            messages: vec![
                history_message("m3", "u2", "u1", 3),
                history_message("m2", "u1", "u2", 2),
                history_message("m1", "u2", "u1", 1),
            ],
            total_pages: Some(1),
        };
        c.ingest_history_page(&full_but_last);
        assert!(c.history_exhausted());

        let mut c = controller();
        let empty = ConversationPage::default();
        assert_eq!(c.ingest_history_page(&empty), 0);
        assert!(c.history_exhausted());
        assert!(c.conversation_id().is_none());
    }

    #[test]
    fn test_typing_flag_refreshes_and_expires() {
        let mut c = connected_controller();
        let typing = Typing {
            recipient_id: "u1".into(),
            sender_id: "u2".into(),
        };

        c.handle_event(ServerEvent::UserTyping(typing.clone()), now());
        assert!(c.is_peer_typing(now() + Duration::milliseconds(500)));

        // A second event pushes the quiet deadline out.
        c.handle_event(
            ServerEvent::UserTyping(typing),
            now() + Duration::milliseconds(800),
        );
        assert!(c.is_peer_typing(now() + Duration::milliseconds(1500)));

        c.on_tick(now() + Duration::milliseconds(1800));
        assert!(!c.is_peer_typing(now() + Duration::milliseconds(1800)));

        // Typing from someone else never sets the flag.
        c.handle_event(
            ServerEvent::UserTyping(Typing {
                recipient_id: "u1".into(),
                sender_id: "u9".into(),
            }),
            now(),
        );
        assert!(!c.is_peer_typing(now() + Duration::milliseconds(100)));
    }

    #[test]
    fn test_read_receipt_is_idempotent() {
        let mut c = connected_controller();
        let payload = c.compose_send("hi", now()).unwrap();
        c.handle_event(
            ServerEvent::MessageSent(SendAck {
                temp_id: payload.temp_id,
                message_id: "m1".into(),
                conversation_id: None,
            }),
            now(),
        );

        for _ in 0..2 {
            c.handle_event(
                ServerEvent::MessageRead(ReadReceipt {
                    message_id: "m1".into(),
                }),
                now(),
            );
            assert_eq!(c.messages()[0].status, MessageStatus::Read);
        }
    }

    #[test]
    fn test_presence_updates_only_for_active_peer() {
        let mut c = connected_controller();
        assert_eq!(c.peer().presence, Presence::Offline);

        c.handle_event(
            ServerEvent::UserStatus(StatusUpdate {
                user_id: "u9".into(),
                status: Presence::Online,
            }),
            now(),
        );
        assert_eq!(c.peer().presence, Presence::Offline);

        c.handle_event(
            ServerEvent::UserStatus(StatusUpdate {
                user_id: "u2".into(),
                status: Presence::Online,
            }),
            now(),
        );
        assert_eq!(c.peer().presence, Presence::Online);
    }

    #[test]
    fn test_welcome_appends_system_message() {
        let mut c = connected_controller();
        c.handle_event(ServerEvent::Welcome("hello alice".into()), now());
        let msg = c.messages().last().unwrap();
        assert_eq!(msg.status, MessageStatus::System);
        assert_eq!(msg.sender_id, "system");
        assert!(msg.id.starts_with("system-"));
    }

    #[test]
    fn test_next_deadline_tracks_sends_and_typing() {
        let mut c = connected_controller();
        assert!(c.next_deadline().is_none());

        c.compose_send("hi", now()).unwrap();
        assert_eq!(c.next_deadline(), Some(now() + Duration::seconds(10)));

        c.handle_event(
            ServerEvent::UserTyping(Typing {
                recipient_id: "u1".into(),
                sender_id: "u2".into(),
            }),
            now(),
        );
        // The typing quiet window is sooner than the ack timeout.
        assert_eq!(c.next_deadline(), Some(now() + Duration::milliseconds(1000)));
    }
}
