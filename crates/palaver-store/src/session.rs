//! The session store: three durable entries behind one JSON file.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use palaver_shared::types::UserProfile;

use crate::error::{Result, StoreError};

/// Everything the client persists between runs.
///
/// Tokens are stored verbatim; an empty string means absent. The invariant
/// callers rely on: an empty refresh token means unauthenticated regardless
/// of the access token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Handle to the persisted session, safe to share across tasks.
pub struct SessionStore {
    path: PathBuf,
    state: Mutex<SessionState>,
}

impl SessionStore {
    /// Open the store at the platform default location
    /// (e.g. `~/.local/share/palaver/session.json`).
    pub fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "palaver").ok_or(StoreError::NoDataDir)?;
        Self::open(dirs.data_dir().join("session.json"))
    }

    /// Open the store at an explicit path, loading existing state if present.
    ///
    /// A corrupt session file is discarded rather than bricking startup.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding corrupt session file");
                    SessionState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionState::default(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), "Session store opened");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Access token, `None` when empty.
    pub fn access_token(&self) -> Option<String> {
        self.read(|s| non_empty(&s.access_token)).ok().flatten()
    }

    /// Refresh token, `None` when empty.
    pub fn refresh_token(&self) -> Option<String> {
        self.read(|s| non_empty(&s.refresh_token)).ok().flatten()
    }

    /// Whether the stored session counts as authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.refresh_token().is_some()
    }

    /// Cached user profile, if one was fetched before.
    pub fn profile(&self) -> Option<UserProfile> {
        self.read(|s| s.user.clone()).ok().flatten()
    }

    /// Overwrite the access token, and the refresh token only when a new one
    /// is supplied. `Some("")` explicitly stores an empty (absent) token.
    pub fn set_tokens(&self, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        self.mutate(|s| {
            s.access_token = access_token.to_string();
            if let Some(refresh) = refresh_token {
                s.refresh_token = refresh.to_string();
            }
        })
    }

    /// Cache the user profile.
    pub fn set_profile(&self, profile: &UserProfile) -> Result<()> {
        self.mutate(|s| s.user = Some(profile.clone()))
    }

    /// Drop all three entries and delete the session file.
    pub fn clear(&self) -> Result<()> {
        {
            let mut guard = self.state.lock().map_err(|_| StoreError::Poisoned)?;
            *guard = SessionState::default();
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!("Session cleared");
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&SessionState) -> T) -> Result<T> {
        let guard = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&guard))
    }

    fn mutate(&self, f: impl FnOnce(&mut SessionState)) -> Result<()> {
        let snapshot = {
            let mut guard = self.state.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard);
            guard.clone()
        };
        self.persist(&snapshot)
    }

    fn persist(&self, state: &SessionState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
