//! Password reset flow.
//!
//! Two nested state machines: token verification (`loading → verified |
//! error`) gates a form sub-flow (`idle → loading → {success | error}`).
//! Field validation never reaches the network.

use url::Url;

use palaver_api::{ApiClient, HttpTransport};

use super::error_message;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Verified { message: String },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetState {
    Idle,
    Loading,
    Success { message: String },
    Error { message: String },
}

pub struct ResetPasswordFlow {
    token: String,
    token_state: TokenState,
    reset_state: ResetState,
}

impl ResetPasswordFlow {
    /// Read the forgot-token from the reset link (once) and verify it.
    /// A link without a token settles as an error without a network call.
    pub async fn verify_link<T: HttpTransport>(
        api: &ApiClient<T>,
        link: &str,
    ) -> Result<Self, url::ParseError> {
        let url = Url::parse(link)?;
        let token = url
            .query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        if token.is_empty() {
            return Ok(Self {
                token,
                token_state: TokenState::Error {
                    message: "Invalid or missing token.".to_string(),
                },
                reset_state: ResetState::Idle,
            });
        }

        let token_state = match api.verify_forgot_token(&token).await {
            Ok(message) => TokenState::Verified {
                message: if message.is_empty() {
                    "Token verified. You can now reset your password.".to_string()
                } else {
                    message
                },
            },
            Err(error) => TokenState::Error {
                message: error_message(&error, "Failed to verify token."),
            },
        };

        Ok(Self {
            token,
            token_state,
            reset_state: ResetState::Idle,
        })
    }

    pub fn token_state(&self) -> &TokenState {
        &self.token_state
    }

    pub fn reset_state(&self) -> &ResetState {
        &self.reset_state
    }

    /// Whether the form sub-flow is reachable.
    pub fn can_submit(&self) -> bool {
        matches!(self.token_state, TokenState::Verified { .. })
    }

    /// Validate the fields and submit the new password.
    pub async fn submit<T: HttpTransport>(
        &mut self,
        api: &ApiClient<T>,
        password: &str,
        confirm_password: &str,
    ) {
        if !self.can_submit() {
            return;
        }

        if password.is_empty() || confirm_password.is_empty() {
            self.reset_state = ResetState::Error {
                message: "Please enter and confirm your new password.".to_string(),
            };
            return;
        }
        if password != confirm_password {
            self.reset_state = ResetState::Error {
                message: "Passwords do not match.".to_string(),
            };
            return;
        }

        self.reset_state = ResetState::Loading;
        self.reset_state = match api
            .reset_password(password, confirm_password, &self.token)
            .await
        {
            Ok(message) => ResetState::Success {
                message: if message.is_empty() {
                    "Password reset successfully! You can now log in.".to_string()
                } else {
                    message
                },
            },
            Err(error) => ResetState::Error {
                message: error_message(&error, "Failed to reset password."),
            },
        };
    }
}
