//! Email verification flow.
//!
//! `loading → {success | expired | error}`, where success runs a visible
//! countdown before navigating home, and expired/error offer a resend that
//! cycles through its own loading → resent/error presentation.

use url::Url;

use palaver_api::{ApiClient, ApiError, HttpTransport};
use palaver_shared::constants::VERIFY_REDIRECT_COUNTDOWN;

use super::error_message;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyState {
    Loading,
    Success { message: String, countdown: u32 },
    Expired { message: String },
    Error { message: String },
    Resent { message: String },
}

pub struct VerifyEmailFlow {
    state: VerifyState,
    email: Option<String>,
}

impl VerifyEmailFlow {
    /// Read the token from the verification link (once) and drive the
    /// verification call. A link without a token never reaches the network.
    pub async fn run<T: HttpTransport>(
        api: &ApiClient<T>,
        link: &str,
    ) -> Result<Self, url::ParseError> {
        let url = Url::parse(link)?;
        let mut token = None;
        let mut email = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "token" => token = Some(value.into_owned()),
                "email" => email = Some(value.into_owned()),
                _ => {}
            }
        }

        let Some(token) = token else {
            return Ok(Self {
                state: VerifyState::Error {
                    message: "Invalid verification link. No token provided.".to_string(),
                },
                email,
            });
        };

        let state = match api.verify_email(&token).await {
            Ok(message) => VerifyState::Success {
                message: if message.is_empty() {
                    "Your email has been successfully verified!".to_string()
                } else {
                    message
                },
                countdown: VERIFY_REDIRECT_COUNTDOWN,
            },
            Err(error) => Self::verification_failure(&error),
        };

        Ok(Self { state, email })
    }

    /// 410 or an explicit "expired" reason means the link can be renewed;
    /// everything else is a hard failure.
    fn verification_failure(error: &ApiError) -> VerifyState {
        let message = error_message(error, "Failed to verify email. Please try again.");
        let expired = matches!(error, ApiError::Server { status: 410, .. })
            || message.to_lowercase().contains("expired");
        if expired {
            VerifyState::Expired {
                message: if message.is_empty() {
                    "This verification link has expired. Please request a new one.".to_string()
                } else {
                    message
                },
            }
        } else {
            VerifyState::Error { message }
        }
    }

    pub fn state(&self) -> &VerifyState {
        &self.state
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// One countdown tick. Returns `true` when it is time to navigate home.
    pub fn tick(&mut self) -> bool {
        if let VerifyState::Success { countdown, .. } = &mut self.state {
            *countdown = countdown.saturating_sub(1);
            return *countdown == 0;
        }
        false
    }

    /// Request a fresh verification link for the known email address.
    pub async fn resend<T: HttpTransport>(&mut self, api: &ApiClient<T>) {
        let Some(email) = self.email.clone() else {
            self.state = VerifyState::Error {
                message: "Email address not found. Please try logging in again.".to_string(),
            };
            return;
        };

        self.state = VerifyState::Loading;
        self.state = match api.resend_verify_email(&email).await {
            Ok(message) => VerifyState::Resent {
                message: if message.is_empty() {
                    "A new verification email has been sent! Check your inbox.".to_string()
                } else {
                    message
                },
            },
            Err(error) => VerifyState::Error {
                message: error_message(&error, "Failed to resend verification email."),
            },
        };
    }
}
