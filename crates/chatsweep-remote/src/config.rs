//! Client configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Remote client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the service API (e.g. `https://scanner.example.com/api/`).
    pub base_url: String,
    /// Bearer token sent with every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for a single request/response exchange.
    pub request_timeout: Duration,
    /// Maximum silence on the event stream before it is considered dead.
    pub stream_idle_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8080/api/")
    }
}

impl ClientConfig {
    /// Creates a new configuration with default timeouts.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            stream_idle_timeout: Duration::from_secs(90),
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(base_url)
    }
}

/// Builder for client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Creates a new builder with the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(base_url),
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.config.auth_token = Some(token.into());
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the event stream idle timeout.
    #[must_use]
    pub const fn stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.stream_idle_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = ClientConfig::new("https://scanner.example.com/api/");
        assert_eq!(config.base_url, "https://scanner.example.com/api/");
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::builder("https://scanner.example.com/api/")
            .auth_token("secret")
            .request_timeout(Duration::from_secs(5))
            .stream_idle_timeout(Duration::from_secs(30))
            .build();

        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.stream_idle_timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url":"https://other.example.com/"}"#).unwrap();
        assert_eq!(config.base_url, "https://other.example.com/");
        assert_eq!(config.stream_idle_timeout, Duration::from_secs(90));
    }
}
