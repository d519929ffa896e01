//! OAuth callback handling.
//!
//! The provider redirects back with `access_token`, `refresh_token` and
//! `new_user` in the query string. Both tokens are stored exactly as sent —
//! empty when absent — and a one-shot welcome notice is prepared.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tracing::info;
use url::Url;

use palaver_shared::constants::LOGIN_REDIRECT_DELAY_SECS;
use palaver_store::{SessionStore, StoreError};

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Invalid callback URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Which welcome notice to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginNotice {
    /// `new_user=true`: the account was just created.
    AccountCreated,
    /// `new_user=false`: a returning user.
    WelcomeBack,
}

/// Settled state of the login callback route.
pub struct LoginCallback {
    notice: Option<LoginNotice>,
    notified: bool,
}

impl LoginCallback {
    /// Store the token pair from the callback query and prepare the notice.
    pub fn handle(store: &SessionStore, callback_url: &str) -> Result<Self, LoginError> {
        let url = Url::parse(callback_url)?;
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        let access = params.get("access_token").map(String::as_str).unwrap_or("");
        let refresh = params.get("refresh_token").map(String::as_str).unwrap_or("");
        store.set_tokens(access, Some(refresh))?;

        let notice = match params.get("new_user").map(String::as_str) {
            Some("true") => Some(LoginNotice::AccountCreated),
            Some("false") => Some(LoginNotice::WelcomeBack),
            _ => None,
        };

        info!(new_user = ?params.get("new_user"), "Login callback processed");
        Ok(Self {
            notice,
            notified: false,
        })
    }

    /// The welcome notice — yielded exactly once, no matter how often the
    /// caller polls.
    pub fn take_notice(&mut self) -> Option<LoginNotice> {
        if self.notified {
            return None;
        }
        self.notified = true;
        self.notice
    }

    /// How long to linger before navigating home.
    pub fn redirect_delay() -> Duration {
        Duration::from_secs(LOGIN_REDIRECT_DELAY_SECS)
    }
}
