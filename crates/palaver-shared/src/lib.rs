//! Domain types and wire protocol shared by every Palaver crate.

pub mod constants;
pub mod protocol;
pub mod types;

pub use protocol::{ClientEvent, ServerEvent};
pub use types::{ChatMessage, MessageStatus, Presence, UserProfile};
