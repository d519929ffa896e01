//! The HTTP transport seam.
//!
//! [`ApiClient`](crate::client::ApiClient) talks to the network through the
//! [`HttpTransport`] trait so the refresh/retry logic can be exercised with a
//! scripted transport in tests. [`ReqwestTransport`] is the real thing.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

/// HTTP method subset the backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outbound request, fully described.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path plus query string, joined onto the configured base origin.
    pub path: String,
    pub body: Option<Value>,
    /// Bearer token to attach, when one is available.
    pub bearer: Option<String>,
}

/// Status and decoded JSON body of a response.
///
/// Bodies that are empty or not JSON decode to `Value::Null`; the status is
/// what drives dispatch, the body is only consulted for payloads/messages.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Production transport over a shared `reqwest::Client`.
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = ?request.method, url = %url, "API request");

        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        };

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        debug!(status, "API response");
        Ok(HttpResponse { status, body })
    }
}

/// Best-effort human message from a response body.
pub fn response_message(body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}
