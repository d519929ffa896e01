//! Async orchestration of one chat session.
//!
//! A session walks `SelectingPeer → Connecting → Active`: validate the
//! handle, look up the peer, pull the first history page, open the channel.
//! Once active, [`ChatSession::next_event`] is the single queue every
//! channel notification and timer expiry drains through. Switching peers
//! means closing the session and connecting a new one — dropping it cancels
//! pending failure timers and the dedup index wholesale.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use palaver_api::{ApiClient, ApiError, Config, HttpTransport};
use palaver_channel::{spawn_channel, ChannelCommand, ChannelConfig, ChannelNotification};
use palaver_shared::constants::{HISTORY_PAGE_SIZE, MIN_HANDLE_LEN};
use palaver_shared::protocol::ClientEvent;
use palaver_shared::types::UserProfile;

use crate::controller::ChatController;

/// Why a handle was rejected before any lookup was issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("Enter a username")]
    Empty,
    #[error("Usernames have at least {MIN_HANDLE_LEN} characters")]
    TooShort,
    #[error("You cannot chat with yourself")]
    Yourself,
}

/// Why connecting to a peer failed.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("{0}")]
    Handle(#[from] HandleError),
    #[error("User not found")]
    PeerNotFound,
    #[error("{0}")]
    Rejected(String),
    #[error("Session expired, please sign in again")]
    SessionExpired,
    #[error(transparent)]
    Api(ApiError),
}

impl From<ApiError> for ConnectError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::NotFound => ConnectError::PeerNotFound,
            ApiError::BadRequest(reason) => ConnectError::Rejected(reason),
            ApiError::SessionExpired => ConnectError::SessionExpired,
            other => ConnectError::Api(other),
        }
    }
}

/// Validate a human-entered handle against the local profile.
pub fn validate_handle(handle: &str, me: &UserProfile) -> Result<String, HandleError> {
    let handle = handle.trim();
    if handle.is_empty() {
        return Err(HandleError::Empty);
    }
    if handle.chars().count() < MIN_HANDLE_LEN {
        return Err(HandleError::TooShort);
    }

    let lowered = handle.to_lowercase();
    let own_username = me.username.as_deref().map(str::to_lowercase);
    if own_username.as_deref() == Some(lowered.as_str()) || me.name.to_lowercase() == lowered {
        return Err(HandleError::Yourself);
    }

    Ok(handle.to_string())
}

/// What [`ChatSession::next_event`] woke up for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Controller state changed: new message, status flip, presence, typing.
    Updated,
    /// These optimistic sends hit their timeout and are now failed.
    SendFailed(Vec<String>),
    /// The channel's reconnect budget ran out; the session is over.
    ChannelGone,
}

/// An active private-chat session with one peer.
#[derive(Debug)]
pub struct ChatSession {
    controller: ChatController,
    cmd_tx: mpsc::Sender<ChannelCommand>,
    notif_rx: mpsc::Receiver<ChannelNotification>,
    channel_gone: bool,
}

impl ChatSession {
    /// Look up the peer, load the first history page, and open the channel.
    pub async fn connect<T: HttpTransport>(
        api: &ApiClient<T>,
        config: &Config,
        handle: &str,
    ) -> Result<Self, ConnectError> {
        let me = match api.store().profile() {
            Some(profile) => profile,
            None => api.me().await?,
        };
        let handle = validate_handle(handle, &me)?;

        let peer = api.user_by_handle(&handle).await?;
        info!(peer = %peer.id, "Peer resolved, loading history");

        let peer_id = peer.id.clone();
        let mut controller = ChatController::new(me, peer, HISTORY_PAGE_SIZE);
        let page = api
            .conversation_with_recipient(&peer_id, HISTORY_PAGE_SIZE, 1)
            .await?;
        controller.ingest_history_page(&page);

        let channel_config =
            ChannelConfig::new(config.channel_url.clone(), api.store().access_token());
        let (cmd_tx, notif_rx) = spawn_channel(channel_config);

        Ok(Self {
            controller,
            cmd_tx,
            notif_rx,
            channel_gone: false,
        })
    }

    pub fn controller(&self) -> &ChatController {
        &self.controller
    }

    pub fn is_connected(&self) -> bool {
        self.controller.is_connected()
    }

    /// Wait for the next state change. All channel notifications and timer
    /// expirations funnel through here, in arrival order.
    pub async fn next_event(&mut self) -> SessionEvent {
        if self.channel_gone {
            return SessionEvent::ChannelGone;
        }

        tokio::select! {
            notification = self.notif_rx.recv() => {
                match notification {
                    Some(ChannelNotification::Up) => {
                        self.controller.set_connected(true);
                        SessionEvent::Updated
                    }
                    Some(ChannelNotification::Down) => {
                        self.controller.set_connected(false);
                        SessionEvent::Updated
                    }
                    Some(ChannelNotification::Event(event)) => {
                        self.controller.handle_event(event, Utc::now());
                        SessionEvent::Updated
                    }
                    Some(ChannelNotification::Gone) | None => {
                        self.channel_gone = true;
                        self.controller.set_connected(false);
                        SessionEvent::ChannelGone
                    }
                }
            }
            () = sleep_until(self.controller.next_deadline()) => {
                let failed = self.controller.on_tick(Utc::now());
                if failed.is_empty() {
                    SessionEvent::Updated
                } else {
                    SessionEvent::SendFailed(failed)
                }
            }
        }
    }

    /// Send a message. The optimistic entry lands in the list before the
    /// event goes out; `false` means the send was rejected outright.
    pub async fn send(&mut self, text: &str) -> bool {
        if self.channel_gone {
            return false;
        }
        let Some(payload) = self.controller.compose_send(text, Utc::now()) else {
            return false;
        };

        // A dead task just means no ack: the failure timer surfaces it.
        if let Err(e) = self
            .cmd_tx
            .send(ChannelCommand::Send(ClientEvent::PrivateMessage(payload)))
            .await
        {
            warn!(error = %e, "Channel task unavailable for send");
        }
        true
    }

    /// Re-send a failed message under a fresh temp id.
    pub async fn resend(&mut self, message_id: &str) -> bool {
        if self.channel_gone {
            return false;
        }
        let Some(payload) = self.controller.compose_resend(message_id, Utc::now()) else {
            return false;
        };
        if let Err(e) = self
            .cmd_tx
            .send(ChannelCommand::Send(ClientEvent::PrivateMessage(payload)))
            .await
        {
            warn!(error = %e, "Channel task unavailable for resend");
        }
        true
    }

    /// Tell the peer we are composing.
    pub async fn notify_typing(&mut self) {
        if self.channel_gone {
            return;
        }
        if let Some(payload) = self.controller.compose_typing() {
            let _ = self
                .cmd_tx
                .send(ChannelCommand::Send(ClientEvent::Typing(payload)))
                .await;
        }
    }

    /// Fetch the next (older) history page. Returns how many messages were
    /// added; 0 once history is exhausted or no conversation exists yet.
    pub async fn load_more<T: HttpTransport>(
        &mut self,
        api: &ApiClient<T>,
    ) -> Result<usize, ApiError> {
        if self.controller.history_exhausted() {
            return Ok(0);
        }
        let Some(conversation_id) = self.controller.conversation_id().map(str::to_string) else {
            debug!("No conversation id yet, nothing to page through");
            return Ok(0);
        };

        let page = api
            .conversation_page(
                &conversation_id,
                HISTORY_PAGE_SIZE,
                self.controller.next_page(),
            )
            .await?;
        Ok(self.controller.ingest_history_page(&page))
    }

    /// Close the channel and tear the session down.
    pub async fn close(self) {
        let _ = self.cmd_tx.send(ChannelCommand::Close).await;
        // Dropping the controller discards pending deadlines and the dedup
        // index; dropping notif_rx detaches the event stream.
    }
}

async fn sleep_until(deadline: Option<DateTime<Utc>>) {
    match deadline {
        Some(deadline) => {
            let wait = (deadline - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{profile, scripted_client};
    use serde_json::json;

    #[test]
    fn test_validate_handle() {
        let me = profile("u1", "Alice");

        assert_eq!(validate_handle("  ", &me), Err(HandleError::Empty));
        assert_eq!(validate_handle("ab", &me), Err(HandleError::TooShort));
        assert_eq!(validate_handle("alice", &me), Err(HandleError::Yourself));
        assert_eq!(validate_handle("ALICE", &me), Err(HandleError::Yourself));
        assert_eq!(validate_handle(" bob ", &me).as_deref(), Ok("bob"));
    }

    #[tokio::test]
    async fn test_unknown_handle_never_reaches_active() {
        let (_dir, client) = scripted_client(vec![(404, json!({"message": "User not found"}))]);

        let err = ChatSession::connect(&client, &Config::default(), "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::PeerNotFound));
    }

    #[tokio::test]
    async fn test_server_rejection_surfaces_reason() {
        let (_dir, client) =
            scripted_client(vec![(400, json!({"message": "Cannot chat with this user"}))]);

        let err = ChatSession::connect(&client, &Config::default(), "mallory")
            .await
            .unwrap_err();
        match err {
            ConnectError::Rejected(reason) => assert_eq!(reason, "Cannot chat with this user"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handle_validation_issues_no_lookup() {
        let (_dir, client) = scripted_client(vec![]);

        let err = ChatSession::connect(&client, &Config::default(), "al")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Handle(HandleError::TooShort)));
    }

    #[tokio::test]
    async fn test_connect_loads_history_and_adopts_conversation() {
        let (_dir, client) = scripted_client(vec![
            (200, json!({"user": {"_id": "u2", "name": "Bob", "email": "b@x.io"}})),
            (
                200,
                json!({"result": [{
                    "_id": "m1",
                    "message": "old",
                    "senderId": "u2",
                    "recipientId": "u1",
                    "conversationId": "c1",
                    "timestamp": "2025-01-01T00:00:00Z",
                    "status": "sent"
                }]}),
            ),
        ]);

        let session = ChatSession::connect(&client, &Config::default(), "bob")
            .await
            .unwrap();
        assert_eq!(session.controller().conversation_id(), Some("c1"));
        assert_eq!(session.controller().messages().len(), 1);
        // One short page means history is already exhausted.
        assert!(session.controller().history_exhausted());
        assert!(!session.is_connected());
        session.close().await;
    }
}
