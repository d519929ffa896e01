//! Line-oriented terminal front end.
//!
//! `palaver login <callback-url>` stores the tokens from an OAuth redirect,
//! `palaver chat <handle>` opens a private chat, `palaver logout` clears the
//! session. Inside a chat: plain lines send, `/more` pages older history,
//! `/resend <id>` retries a failed message, `/quit` leaves.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use palaver_api::{ApiClient, Config};
use palaver_client::flows::login::{LoginCallback, LoginNotice};
use palaver_client::session::{ChatSession, SessionEvent};
use palaver_shared::types::{ChatMessage, MessageStatus};
use palaver_store::SessionStore;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("palaver_client=info,palaver_channel=info,palaver_api=warn,warn")
    });
    fmt().with_env_filter(filter).with_target(false).init();

    let config = Config::from_env();
    let store = Arc::new(SessionStore::open_default().context("opening session store")?);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>()[..] {
        ["login", url] => login(&store, url).await,
        ["logout"] => {
            store.clear()?;
            println!("Signed out.");
            Ok(())
        }
        ["chat", handle] => chat(&config, store, handle).await,
        _ => {
            println!("Usage: palaver <login CALLBACK_URL | chat HANDLE | logout>");
            println!();
            println!("Sign in with your browser, then paste the redirect URL:");
            println!("  {}", config.authorize_url());
            Ok(())
        }
    }
}

async fn login(store: &SessionStore, callback_url: &str) -> Result<()> {
    let mut callback = LoginCallback::handle(store, callback_url)?;

    match callback.take_notice() {
        Some(LoginNotice::AccountCreated) => {
            println!("Welcome! Your account has been created successfully.");
        }
        Some(LoginNotice::WelcomeBack) => {
            println!("Welcome back! You have logged in successfully.");
        }
        None => println!("Tokens stored."),
    }

    if !store.is_authenticated() {
        println!("Warning: the callback carried no refresh token; you are not signed in.");
        return Ok(());
    }

    tokio::time::sleep(LoginCallback::redirect_delay()).await;
    println!("Ready. Start chatting with: palaver chat <handle>");
    Ok(())
}

async fn chat(config: &Config, store: Arc<SessionStore>, handle: &str) -> Result<()> {
    if !store.is_authenticated() {
        bail!("No session. Sign in first via:\n  {}", config.authorize_url());
    }

    let api = ApiClient::new(config, store);
    let mut session = ChatSession::connect(&api, config, handle).await?;

    let me_id = session.controller().me().id.clone();
    let peer_name = session.controller().peer().profile.name.clone();
    println!("-- chat with {peer_name} --");

    let mut rendered = 0;
    sync_render(&session, &mut rendered, &me_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut peer_typing = false;
    let mut connected = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim().to_string();
                match line.as_str() {
                    "" => {}
                    "/quit" => break,
                    "/more" => {
                        let added = session.load_more(&api).await?;
                        if added == 0 {
                            println!("-- no older messages --");
                        } else {
                            println!("-- {added} older messages --");
                            for msg in &session.controller().messages()[..added] {
                                print_message(msg, &me_id);
                            }
                            rendered += added;
                        }
                    }
                    _ if line.starts_with("/resend ") => {
                        let id = line.trim_start_matches("/resend ").trim();
                        if session.resend(id).await {
                            // The failed bubble was replaced by a fresh one.
                            rendered = rendered.saturating_sub(1);
                            sync_render(&session, &mut rendered, &me_id);
                        } else {
                            println!("! nothing to resend for '{id}'");
                        }
                    }
                    _ => {
                        if !session.send(&line).await {
                            println!("! not connected, message dropped");
                        }
                        sync_render(&session, &mut rendered, &me_id);
                    }
                }
            }
            event = session.next_event() => {
                match event {
                    SessionEvent::Updated => {
                        sync_render(&session, &mut rendered, &me_id);

                        if session.is_connected() != connected {
                            connected = session.is_connected();
                            println!("-- {} --", if connected { "connected" } else { "offline, reconnecting" });
                        }

                        let typing = session.controller().is_peer_typing(Utc::now());
                        if typing != peer_typing {
                            peer_typing = typing;
                            if typing {
                                println!("-- {peer_name} is typing... --");
                            }
                        }
                    }
                    SessionEvent::SendFailed(ids) => {
                        for id in ids {
                            println!("! message not delivered, retry with: /resend {id}");
                        }
                    }
                    SessionEvent::ChannelGone => {
                        println!("-- connection lost for good --");
                        break;
                    }
                }
            }
        }
    }

    session.close().await;
    Ok(())
}

/// Print any messages appended since the last call.
fn sync_render(session: &ChatSession, rendered: &mut usize, me_id: &str) {
    let messages = session.controller().messages();
    for msg in &messages[*rendered..] {
        print_message(msg, me_id);
    }
    *rendered = messages.len();
}

fn print_message(msg: &ChatMessage, me_id: &str) {
    let time = msg.timestamp.format("%H:%M");
    match msg.status {
        MessageStatus::System => println!("[{time}] * {}", msg.text),
        _ if msg.sender_id == me_id => {
            println!("[{time}] you: {} {}", msg.text, status_mark(msg.status));
        }
        _ => println!("[{time}] them: {}", msg.text),
    }
}

fn status_mark(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Sending => "(sending)",
        MessageStatus::Sent => "(sent)",
        MessageStatus::Received => "",
        MessageStatus::Read => "(read)",
        MessageStatus::Failed => "(FAILED)",
        MessageStatus::System => "",
    }
}
