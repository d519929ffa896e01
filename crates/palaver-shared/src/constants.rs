/// Application name
pub const APP_NAME: &str = "Palaver";

/// Prefix of locally generated message ids awaiting acknowledgement
pub const TEMP_ID_PREFIX: &str = "temp-";

/// How long a sent message may wait for its acknowledgement before it is
/// marked failed (seconds)
pub const SEND_ACK_TIMEOUT_SECS: i64 = 10;

/// Quiet interval after which the peer-is-typing flag clears (milliseconds)
pub const TYPING_QUIET_MILLIS: i64 = 1_000;

/// Conversation history page size
pub const HISTORY_PAGE_SIZE: u32 = 50;

/// Maximum websocket reconnect attempts before the channel gives up
pub const RECONNECT_ATTEMPTS: u32 = 5;

/// Fixed delay between reconnect attempts (milliseconds)
pub const RECONNECT_DELAY_MILLIS: u64 = 1_000;

/// Minimum length of a peer handle accepted before a lookup is issued
pub const MIN_HANDLE_LEN: usize = 3;

/// Delay before the login callback navigates home (seconds)
pub const LOGIN_REDIRECT_DELAY_SECS: u64 = 3;

/// Visible countdown after a successful email verification (ticks of 1s)
pub const VERIFY_REDIRECT_COUNTDOWN: u32 = 5;
