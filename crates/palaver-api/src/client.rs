//! The authenticated API client.
//!
//! One instance per process, shared by every flow. All authenticated calls
//! funnel through [`ApiClient::request`], which owns the 401 → refresh →
//! replay rule: at most one refresh and one replay per logical call, no
//! matter how many 401s come back.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use palaver_shared::types::UserProfile;
use palaver_store::SessionStore;

use crate::config::Config;
use crate::dto::{self, ConversationPage};
use crate::error::{ApiError, Result};
use crate::transport::{
    response_message, HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport,
};

pub struct ApiClient<T: HttpTransport = ReqwestTransport> {
    transport: T,
    store: Arc<SessionStore>,
}

impl ApiClient<ReqwestTransport> {
    pub fn new(config: &Config, store: Arc<SessionStore>) -> Self {
        Self::with_transport(ReqwestTransport::new(config.api_base_url.clone()), store)
    }
}

impl<T: HttpTransport> ApiClient<T> {
    pub fn with_transport(transport: T, store: Arc<SessionStore>) -> Self {
        Self { transport, store }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -- Endpoints ---------------------------------------------------------

    /// Look up a user by handle.
    pub async fn user_by_handle(&self, handle: &str) -> Result<UserProfile> {
        let body = self
            .request(Method::Get, &format!("/users/{handle}"), None)
            .await?;
        Ok(dto::unwrap_user(&body)?)
    }

    /// Fetch the authenticated user's own profile and cache it.
    pub async fn me(&self) -> Result<UserProfile> {
        let body = self.request(Method::Get, "/users/me", None).await?;
        let profile = dto::unwrap_user(&body)?;
        self.store.set_profile(&profile)?;
        Ok(profile)
    }

    /// A page of history with a peer, newest first. Used before the
    /// conversation id is known.
    pub async fn conversation_with_recipient(
        &self,
        recipient_id: &str,
        limit: u32,
        page: u32,
    ) -> Result<ConversationPage> {
        let path = format!("/conversations/recipient/{recipient_id}?limit={limit}&page={page}");
        let body = self.request(Method::Get, &path, None).await?;
        Ok(dto::unwrap_page(&body)?)
    }

    /// A page of an identified conversation, newest first.
    pub async fn conversation_page(
        &self,
        conversation_id: &str,
        limit: u32,
        page: u32,
    ) -> Result<ConversationPage> {
        let path = format!("/conversations/{conversation_id}?limit={limit}&page={page}");
        let body = self.request(Method::Get, &path, None).await?;
        Ok(dto::unwrap_page(&body)?)
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<String> {
        let body = self
            .request(
                Method::Post,
                "/users/forgot-password",
                Some(json!({ "email": email })),
            )
            .await?;
        Ok(response_message(&body))
    }

    pub async fn verify_forgot_token(&self, token: &str) -> Result<String> {
        let body = self
            .request(
                Method::Post,
                "/users/verify-forgot-password",
                Some(json!({ "forgot_password_token": token })),
            )
            .await?;
        Ok(response_message(&body))
    }

    pub async fn reset_password(
        &self,
        password: &str,
        confirm_password: &str,
        token: &str,
    ) -> Result<String> {
        let body = self
            .request(
                Method::Post,
                "/users/reset-password",
                Some(json!({
                    "password": password,
                    "confirm_password": confirm_password,
                    "forgot_password_token": token,
                })),
            )
            .await?;
        Ok(response_message(&body))
    }

    pub async fn verify_email(&self, token: &str) -> Result<String> {
        let body = self
            .request(
                Method::Post,
                "/users/verify-email",
                Some(json!({ "email_verify_token": token })),
            )
            .await?;
        Ok(response_message(&body))
    }

    pub async fn resend_verify_email(&self, email: &str) -> Result<String> {
        let body = self
            .request(
                Method::Post,
                "/resend-verify-email",
                Some(json!({ "email": email })),
            )
            .await?;
        Ok(response_message(&body))
    }

    // -- Core --------------------------------------------------------------

    /// Issue an authenticated request with the single-refresh retry rule.
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let first = self
            .send(method, path, body.clone(), self.store.access_token())
            .await?;
        if first.status != 401 {
            return dispatch(first);
        }

        // One refresh, one replay. A second 401 fails the call for good.
        self.refresh().await?;
        let retried = self
            .send(method, path, body, self.store.access_token())
            .await?;
        if retried.status == 401 {
            warn!(path, "Replayed request still unauthorized");
            return Err(ApiError::SessionExpired);
        }
        dispatch(retried)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        bearer: Option<String>,
    ) -> Result<HttpResponse> {
        self.transport
            .execute(HttpRequest {
                method,
                path: path.to_string(),
                body,
                bearer,
            })
            .await
    }

    /// Swap the stored token pair for a fresh one. Any failure clears the
    /// session, so the caller can only ever see `SessionExpired` from here.
    async fn refresh(&self) -> Result<()> {
        let Some(refresh_token) = self.store.refresh_token() else {
            self.store.clear()?;
            return Err(ApiError::SessionExpired);
        };

        let outcome = self
            .send(
                Method::Post,
                "/users/refresh-token",
                Some(json!({ "refresh_token": refresh_token })),
                None,
            )
            .await;

        let pair = match outcome {
            Ok(response) if response.is_success() => match dto::unwrap_tokens(&response.body) {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Refresh response missing token pair");
                    self.store.clear()?;
                    return Err(ApiError::SessionExpired);
                }
            },
            Ok(response) => {
                info!(status = response.status, "Token refresh rejected, session cleared");
                self.store.clear()?;
                return Err(ApiError::SessionExpired);
            }
            Err(e) => {
                warn!(error = %e, "Token refresh unreachable, session cleared");
                self.store.clear()?;
                return Err(ApiError::SessionExpired);
            }
        };

        // A refresh response without a new refresh token keeps the stored one.
        self.store
            .set_tokens(&pair.access_token, pair.refresh_token.as_deref())?;
        debug!("Access token refreshed");
        Ok(())
    }
}

fn dispatch(response: HttpResponse) -> Result<Value> {
    if response.is_success() {
        return Ok(response.body);
    }
    match response.status {
        400 => {
            let message = response_message(&response.body);
            let message = if message.is_empty() {
                "Bad request".to_string()
            } else {
                message
            };
            Err(ApiError::BadRequest(message))
        }
        401 => Err(ApiError::SessionExpired),
        404 => Err(ApiError::NotFound),
        status => Err(ApiError::Server {
            status,
            message: response_message(&response.body),
        }),
    }
}
