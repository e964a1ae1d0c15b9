//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [server]
//! log_format = "json"
//!
//! [webhook]
//! listen = "0.0.0.0:8443"
//! callback = "https://example.com/webhooks"
//! secret = "hmac-secret"
//!
//! [socket]
//! listen = "127.0.0.1:8080"
//!
//! [hub]
//! client_id = "abc123"
//! token = "oauth-token"
//! renewal_interval_secs = 86400
//!
//! [event]
//! broadcaster_id = "12345"
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use stream_core::{ChannelConfig, ConfigError, HubConfig, LeaseConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub webhook: WebhookListenerConfig,

    #[serde(default)]
    pub socket: SocketConfig,

    pub hub: HubSection,

    pub event: EventSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".into()
}

/// The listener the provider calls back on.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookListenerConfig {
    #[serde(default = "default_webhook_listen")]
    pub listen: SocketAddr,

    /// Public base URL of this listener as seen by the provider.
    pub callback: String,

    #[serde(default)]
    pub secret: Option<String>,
}

fn default_webhook_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8443))
}

/// The push channel downstream clients connect to.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_socket_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_push_capacity")]
    pub capacity: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            listen: default_socket_listen(),
            capacity: default_push_capacity(),
        }
    }
}

fn default_socket_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_push_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubSection {
    #[serde(default = "default_hub_url")]
    pub url: String,

    pub client_id: String,

    pub token: String,

    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: u32,

    /// Signed so that a negative value is reported as such rather than as a
    /// parse error.
    #[serde(default)]
    pub renewal_interval_secs: Option<i64>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_hub_url() -> String {
    "https://api.twitch.tv/helix/webhooks/hub".into()
}

fn default_lease_seconds() -> u32 {
    864_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSection {
    pub broadcaster_id: String,

    #[serde(default = "default_follows")]
    pub follows: bool,

    #[serde(default = "default_event_limit")]
    pub event_limit: usize,
}

fn default_follows() -> bool {
    true
}

fn default_event_limit() -> usize {
    200
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        self.lease_config().map_err(|e| e.to_string())?;
        self.channel_config().map_err(|e| e.to_string())?;
        self.hub_config().validate().map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn lease_config(&self) -> Result<LeaseConfig, ConfigError> {
        let interval = match self.hub.renewal_interval_secs {
            Some(secs) if secs <= 0 => return Err(ConfigError::NonPositiveRenewalInterval),
            Some(secs) => Some(secs as u64),
            None => None,
        };
        Ok(LeaseConfig::new(interval)?
            .with_lease_seconds(self.hub.lease_seconds)
            .with_request_timeout(self.hub.request_timeout_ms)
            .with_shutdown_timeout(self.hub.shutdown_timeout_ms))
    }

    pub fn channel_config(&self) -> Result<ChannelConfig, ConfigError> {
        Ok(ChannelConfig::new(self.event.broadcaster_id.as_str())?
            .with_follows(self.event.follows)
            .with_event_limit(self.event.event_limit)
            .with_push_capacity(self.socket.capacity))
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            url: self.hub.url.clone(),
            client_id: self.hub.client_id.clone(),
            token: self.hub.token.clone(),
            callback: self.webhook.callback.clone(),
            secret: self.webhook.secret.clone().filter(|s| !s.is_empty()),
        }
    }
}
