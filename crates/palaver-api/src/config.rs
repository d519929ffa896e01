//! Client configuration loaded from environment variables.
//!
//! All settings have development defaults so the client can run against a
//! local backend with zero configuration.

use url::form_urlencoded;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base origin of the REST API.
    /// Env: `API_BASE_URL`
    /// Default: `http://localhost:5000`
    pub api_base_url: String,

    /// Websocket endpoint for the real-time channel.
    /// Env: `CHANNEL_URL`
    /// Default: `ws://localhost:5000/socket`
    pub channel_url: String,

    /// OAuth client id used when building the provider authorize URL.
    /// Env: `OAUTH_CLIENT_ID`
    pub oauth_client_id: String,

    /// Redirect URI registered with the OAuth provider.
    /// Env: `OAUTH_REDIRECT_URI`
    /// Default: `http://localhost:3000/login/oauth`
    pub oauth_redirect_uri: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".to_string(),
            channel_url: "ws://localhost:5000/socket".to_string(),
            oauth_client_id: String::new(),
            oauth_redirect_uri: "http://localhost:3000/login/oauth".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("API_BASE_URL") {
            match normalize_origin(&value) {
                Some(origin) => config.api_base_url = origin,
                None => {
                    tracing::warn!(value = %value, "Invalid API_BASE_URL, using default");
                }
            }
        }

        if let Ok(value) = std::env::var("CHANNEL_URL") {
            if value.starts_with("ws://") || value.starts_with("wss://") {
                config.channel_url = value.trim_end_matches('/').to_string();
            } else {
                tracing::warn!(value = %value, "Invalid CHANNEL_URL, using default");
            }
        }

        if let Ok(value) = std::env::var("OAUTH_CLIENT_ID") {
            config.oauth_client_id = value;
        }

        if let Ok(value) = std::env::var("OAUTH_REDIRECT_URI") {
            config.oauth_redirect_uri = value;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    /// Google OAuth 2.0 authorize URL for the configured client.
    pub fn authorize_url(&self) -> String {
        let query: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.oauth_client_id)
            .append_pair("redirect_uri", &self.oauth_redirect_uri)
            .append_pair("response_type", "code")
            .append_pair(
                "scope",
                "https://www.googleapis.com/auth/userinfo.profile \
                 https://www.googleapis.com/auth/userinfo.email",
            )
            .append_pair("prompt", "consent")
            .append_pair("access_type", "offline")
            .finish();

        format!("https://accounts.google.com/o/oauth2/v2/auth?{query}")
    }
}

/// Accept `http(s)://host[:port]` and strip any trailing slash.
fn normalize_origin(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:5000");
        assert!(config.channel_url.starts_with("ws://"));
    }

    #[test]
    fn test_normalize_origin() {
        assert_eq!(
            normalize_origin("https://api.example.com/").as_deref(),
            Some("https://api.example.com")
        );
        assert!(normalize_origin("api.example.com").is_none());
        assert!(normalize_origin("").is_none());
    }

    #[test]
    fn test_authorize_url_carries_client_and_redirect() {
        let config = Config {
            oauth_client_id: "client-123".into(),
            oauth_redirect_uri: "http://localhost:3000/login/oauth".into(),
            ..Config::default()
        };
        let url = config.authorize_url();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("access_type=offline"));
    }
}
