// Real-time channel: one persistent websocket per authenticated session.

pub mod channel;

mod error;

pub use channel::{spawn_channel, ChannelCommand, ChannelConfig, ChannelNotification};
pub use error::ChannelError;
