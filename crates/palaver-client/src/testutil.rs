//! Shared test helpers: a scripted HTTP transport and a pre-seeded store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use palaver_api::{ApiClient, HttpRequest, HttpResponse, HttpTransport};
use palaver_shared::types::UserProfile;
use palaver_store::SessionStore;

pub fn profile(id: &str, name: &str) -> UserProfile {
    UserProfile {
        id: id.into(),
        name: name.into(),
        email: format!("{}@example.com", name.to_lowercase()),
        avatar: None,
        username: Some(name.to_lowercase()),
    }
}

pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<(u16, Value)>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| HttpResponse { status, body })
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, palaver_api::ApiError> {
        self.requests.lock().unwrap().push(request);
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("transport called more often than scripted"))
    }
}

/// A client over a scripted transport, with an authenticated store whose
/// cached profile is `u1`/`Alice`. The `TempDir` must outlive the client.
pub fn scripted_client(
    responses: Vec<(u16, Value)>,
) -> (tempfile::TempDir, ApiClient<ScriptedTransport>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionStore::open(dir.path().join("session.json")).expect("store");
    store.set_tokens("acc-1", Some("ref-1")).expect("tokens");
    store.set_profile(&profile("u1", "Alice")).expect("profile");

    let client = ApiClient::with_transport(ScriptedTransport::new(responses), Arc::new(store));
    (dir, client)
}
