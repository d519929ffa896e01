//! # palaver-api
//!
//! The single outbound HTTP gateway. Every REST call goes through
//! [`ApiClient`], which attaches the stored bearer token, performs at most
//! one token refresh on a 401 and replays the original call once, and clears
//! the session on irrecoverable auth failures.

pub mod client;
pub mod config;
pub mod dto;
pub mod transport;

mod error;

pub use client::ApiClient;
pub use config::Config;
pub use error::ApiError;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
