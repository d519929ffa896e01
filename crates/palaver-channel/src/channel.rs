//! Channel task with tokio mpsc command/notification pattern.
//!
//! The websocket runs in a dedicated tokio task. The session communicates
//! with it through typed command and notification channels, so the transport
//! stays fully asynchronous and decoupled from chat state.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use palaver_shared::constants::{RECONNECT_ATTEMPTS, RECONNECT_DELAY_MILLIS};
use palaver_shared::protocol::{ClientEvent, ServerEvent};

use crate::error::{ChannelError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the channel task.
#[derive(Debug)]
pub enum ChannelCommand {
    /// Emit an event to the server.
    Send(ClientEvent),
    /// Close the connection and end the task.
    Close,
}

/// Notifications sent *from* the channel task to the session.
#[derive(Debug, Clone)]
pub enum ChannelNotification {
    /// Connected (first connect or a successful reconnect).
    Up,
    /// The live connection dropped; a reconnect follows if budget remains.
    Down,
    /// A decoded server event.
    Event(ServerEvent),
    /// Reconnect budget exhausted; the task has terminated.
    Gone,
}

/// Configuration for spawning the channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Websocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Bearer token attached to the connection request.
    pub access_token: Option<String>,
    /// Reconnect attempts per outage before giving up.
    pub reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Handshake timeout.
    pub connect_timeout: Duration,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            url: url.into(),
            access_token,
            reconnect_attempts: RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MILLIS),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

enum Disconnect {
    /// Closed on request; do not reconnect.
    Closed,
    /// The connection broke underneath us.
    Lost,
}

/// Spawn the channel in a background tokio task.
///
/// Returns channels for sending commands and receiving notifications. The
/// task ends after a `Close` command, when all command senders drop, or when
/// the reconnect budget runs out (signalled by `Gone`).
pub fn spawn_channel(
    config: ChannelConfig,
) -> (
    mpsc::Sender<ChannelCommand>,
    mpsc::Receiver<ChannelNotification>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<ChannelCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<ChannelNotification>(256);

    tokio::spawn(run(config, cmd_rx, notif_tx));

    (cmd_tx, notif_rx)
}

async fn run(
    config: ChannelConfig,
    mut cmd_rx: mpsc::Receiver<ChannelCommand>,
    notif_tx: mpsc::Sender<ChannelNotification>,
) {
    let mut attempts_left = config.reconnect_attempts;

    loop {
        let stream = match connect(&config).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(url = %config.url, error = %e, "Channel connect failed");
                if attempts_left == 0 {
                    let _ = notif_tx.send(ChannelNotification::Gone).await;
                    return;
                }
                attempts_left -= 1;
                tokio::time::sleep(config.reconnect_delay).await;
                continue;
            }
        };

        // A live connection restores the full reconnect budget.
        attempts_left = config.reconnect_attempts;
        info!(url = %config.url, "Channel connected");
        if notif_tx.send(ChannelNotification::Up).await.is_err() {
            return;
        }

        let (mut writer, mut reader) = stream.split();

        let disconnect = loop {
            tokio::select! {
                // --- Outbound commands ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ChannelCommand::Send(event)) => {
                            let text = match event.to_text() {
                                Ok(text) => text,
                                Err(e) => {
                                    warn!(error = %e, "Failed to encode outbound event");
                                    continue;
                                }
                            };
                            if let Err(e) = writer.send(Message::Text(text)).await {
                                warn!(error = %e, "Channel write failed");
                                break Disconnect::Lost;
                            }
                        }
                        Some(ChannelCommand::Close) | None => {
                            let _ = writer.send(Message::Close(None)).await;
                            break Disconnect::Closed;
                        }
                    }
                }

                // --- Inbound frames ---
                frame = reader.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match ServerEvent::from_text(&text) {
                                Ok(Some(event)) => {
                                    if notif_tx
                                        .send(ChannelNotification::Event(event))
                                        .await
                                        .is_err()
                                    {
                                        break Disconnect::Closed;
                                    }
                                }
                                Ok(None) => {
                                    debug!("Skipping unhandled server event");
                                }
                                Err(e) => {
                                    warn!(error = %e, "Malformed channel frame");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            debug!(len = payload.len(), "Channel ping");
                        }
                        Some(Ok(Message::Close(_))) => break Disconnect::Lost,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Channel read error");
                            break Disconnect::Lost;
                        }
                        None => break Disconnect::Lost,
                    }
                }
            }
        };

        match disconnect {
            Disconnect::Closed => {
                info!("Channel closed");
                return;
            }
            Disconnect::Lost => {
                if notif_tx.send(ChannelNotification::Down).await.is_err() {
                    return;
                }
                if attempts_left == 0 {
                    let _ = notif_tx.send(ChannelNotification::Gone).await;
                    return;
                }
                attempts_left -= 1;
                tokio::time::sleep(config.reconnect_delay).await;
            }
        }
    }
}

async fn connect(config: &ChannelConfig) -> Result<WsStream> {
    let request = build_request(&config.url, config.access_token.as_deref())?;

    let (stream, _response) = timeout(config.connect_timeout, connect_async(request))
        .await
        .map_err(|_| {
            ChannelError::WebSocket(format!(
                "connection timeout after {:?}",
                config.connect_timeout
            ))
        })?
        .map_err(|e| ChannelError::WebSocket(e.to_string()))?;

    Ok(stream)
}

/// Build the handshake request, bearer token included.
fn build_request(url: &str, access_token: Option<&str>) -> Result<Request> {
    let parsed = Url::parse(url)?;
    if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
        return Err(ChannelError::InvalidUrl(format!(
            "expected ws:// or wss://, got {}",
            parsed.scheme()
        )));
    }

    let mut request = parsed
        .as_str()
        .into_client_request()
        .map_err(|e| ChannelError::WebSocket(e.to_string()))?;

    if let Some(token) = access_token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ChannelError::WebSocket(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_attaches_bearer() {
        let request = build_request("ws://localhost:5000/socket", Some("tok-1")).unwrap();
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer tok-1"
        );
    }

    #[test]
    fn test_build_request_without_token() {
        let request = build_request("wss://chat.example.com/socket", None).unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_build_request_rejects_http_scheme() {
        let err = build_request("http://localhost:5000", None).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidUrl(_)));
    }
}
