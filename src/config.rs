//! Client configuration.

use std::time::Duration;

use crate::client::Client;
use crate::error::Result;
use crate::repository::RefreshStrategy;

/// Configuration for [`Client`] and [`FeatureRepository`](crate::FeatureRepository).
///
/// # Examples
/// ```no_run
/// # use growthbook::ClientConfig;
/// let client = ClientConfig::new("sdk-abc123")
///     .decryption_key("Zvwv/+uhpFDznZ6SX28Yjg==")
///     .ttl(std::time::Duration::from_secs(30))
///     .into_client()
///     .expect("failed to initialize GrowthBook");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) client_key: String,
    pub(crate) api_host: String,
    pub(crate) decryption_key: Option<String>,
    pub(crate) ttl: Duration,
    pub(crate) refresh_strategy: RefreshStrategy,
    pub(crate) initialization_timeout: Duration,
}

impl ClientConfig {
    /// Default host serving the features endpoint.
    pub const DEFAULT_API_HOST: &'static str = "https://cdn.growthbook.io";
    /// Default time-to-live of a fetched feature map.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
    /// Default time [`Client::init`] waits for the first fetch.
    pub const DEFAULT_INITIALIZATION_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a default configuration using the specified client key.
    pub fn new(client_key: impl Into<String>) -> ClientConfig {
        ClientConfig {
            client_key: client_key.into(),
            api_host: ClientConfig::DEFAULT_API_HOST.to_owned(),
            decryption_key: None,
            ttl: ClientConfig::DEFAULT_TTL,
            refresh_strategy: RefreshStrategy::default(),
            initialization_timeout: ClientConfig::DEFAULT_INITIALIZATION_TIMEOUT,
        }
    }

    /// Override the host serving the features endpoint. Clients should use the default setting in
    /// most cases. Trailing slashes are ignored.
    pub fn api_host(mut self, api_host: impl Into<String>) -> ClientConfig {
        self.api_host = api_host.into();
        self
    }

    /// Set the key used to decrypt encrypted feature payloads (base64, AES-128 or AES-256).
    pub fn decryption_key(mut self, decryption_key: impl Into<String>) -> ClientConfig {
        self.decryption_key = Some(decryption_key.into());
        self
    }

    /// Set how long a fetched feature map stays fresh. Reads past the TTL serve the stale map and
    /// refresh in the background.
    pub fn ttl(mut self, ttl: Duration) -> ClientConfig {
        self.ttl = ttl;
        self
    }

    /// Choose between timer-driven and on-demand refreshing.
    pub fn refresh_strategy(mut self, refresh_strategy: RefreshStrategy) -> ClientConfig {
        self.refresh_strategy = refresh_strategy;
        self
    }

    /// Set how long [`Client::init`] waits for the first fetch.
    pub fn initialization_timeout(mut self, timeout: Duration) -> ClientConfig {
        self.initialization_timeout = timeout;
        self
    }

    /// Create a new [`Client`] using this configuration, waiting for the first feature fetch.
    pub fn into_client(self) -> Result<Client> {
        Client::init(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("sdk-key");
        assert_eq!(config.client_key, "sdk-key");
        assert_eq!(config.api_host, "https://cdn.growthbook.io");
        assert_eq!(config.decryption_key, None);
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.refresh_strategy, RefreshStrategy::Periodic);
        assert_eq!(config.initialization_timeout, Duration::from_secs(5));
    }

    #[test]
    fn builder_overrides() {
        let config = ClientConfig::new("sdk-key")
            .api_host("https://self-hosted.example.com")
            .decryption_key("key")
            .ttl(Duration::from_secs(5))
            .refresh_strategy(RefreshStrategy::Manual)
            .initialization_timeout(Duration::from_secs(1));
        assert_eq!(config.api_host, "https://self-hosted.example.com");
        assert_eq!(config.decryption_key.as_deref(), Some("key"));
        assert_eq!(config.ttl, Duration::from_secs(5));
        assert_eq!(config.refresh_strategy, RefreshStrategy::Manual);
        assert_eq!(config.initialization_timeout, Duration::from_secs(1));
    }
}
