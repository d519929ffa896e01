//! # palaver-store
//!
//! Persistent client session state: the access/refresh token pair and the
//! cached user profile. Nothing else survives a restart — conversation
//! content is in-memory only.
//!
//! The store is a single JSON file under the platform data directory with an
//! in-process handle that is shared across tasks. The HTTP layer is the only
//! writer during a token refresh.

pub mod session;

mod error;

pub use error::StoreError;
pub use session::{SessionState, SessionStore};
