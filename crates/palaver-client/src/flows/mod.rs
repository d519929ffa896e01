//! Short-lived page flows: each drives a single verification or submission
//! call and settles into one of a small set of states.

pub mod forgot_password;
pub mod login;
pub mod reset_password;
pub mod verify_email;

use palaver_api::ApiError;

/// Server-supplied reason when there is one, the fallback otherwise.
fn error_message(error: &ApiError, fallback: &str) -> String {
    let message = match error {
        ApiError::BadRequest(reason) => reason.clone(),
        ApiError::Server { message, .. } => message.clone(),
        ApiError::SessionExpired => error.to_string(),
        _ => String::new(),
    };
    if message.is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
