//! Forgot-password flow: `idle → loading → {success | error}`.

use palaver_api::{ApiClient, HttpTransport};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ForgotState {
    #[default]
    Idle,
    Loading,
    Success,
    Error { message: String },
}

#[derive(Default)]
pub struct ForgotPasswordFlow {
    state: ForgotState,
}

impl ForgotPasswordFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ForgotState {
        &self.state
    }

    /// Shape-check the address, then request the reset email. A malformed
    /// address fails before any network call.
    pub async fn submit<T: HttpTransport>(&mut self, api: &ApiClient<T>, email: &str) {
        self.state = ForgotState::Loading;

        if !email.contains('@') {
            self.state = ForgotState::Error {
                message: "Please enter a valid email address.".to_string(),
            };
            return;
        }

        self.state = match api.request_password_reset(email).await {
            Ok(_) => ForgotState::Success,
            Err(_) => ForgotState::Error {
                message: "Failed to send reset email. Please try again.".to_string(),
            },
        };
    }

    /// "Send another link": back to the form.
    pub fn reset(&mut self) {
        self.state = ForgotState::Idle;
    }
}
