use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lease::Topic;

/// Startup configuration problems. Any of these stops the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("lease renewal interval was not provided")]
    MissingRenewalInterval,
    #[error("lease renewal interval must be positive")]
    NonPositiveRenewalInterval,
    #[error("broadcaster id must not be empty")]
    EmptyBroadcasterId,
    #[error("invalid {field} URL {value}: {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Timing of upstream subscription leases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// How often every topic is re-subscribed. Must be shorter than the lease.
    pub renewal_interval: Duration,
    /// Lease length requested from the hub, in seconds.
    pub lease_seconds: u32,
    /// HTTP timeout for a single subscribe or unsubscribe request.
    pub request_timeout: Duration,
    /// Upper bound on the best-effort unsubscribe pass during shutdown.
    pub shutdown_timeout: Duration,
}

impl LeaseConfig {
    /// Build from the operator-supplied interval. There is no default: an
    /// unrenewed lease silently stops all callbacks once it expires.
    pub fn new(renewal_interval_secs: Option<u64>) -> Result<Self, ConfigError> {
        let secs = renewal_interval_secs.ok_or(ConfigError::MissingRenewalInterval)?;
        if secs == 0 {
            return Err(ConfigError::NonPositiveRenewalInterval);
        }
        Ok(Self {
            renewal_interval: Duration::from_secs(secs),
            lease_seconds: 864_000,
            request_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
        })
    }

    pub fn with_lease_seconds(mut self, secs: u32) -> Self {
        self.lease_seconds = secs;
        self
    }

    pub fn with_request_timeout(mut self, ms: u64) -> Self {
        self.request_timeout = Duration::from_millis(ms);
        self
    }

    pub fn with_shutdown_timeout(mut self, ms: u64) -> Self {
        self.shutdown_timeout = Duration::from_millis(ms);
        self
    }

    /// Whether a lease could lapse between two renewals.
    pub fn renews_before_expiry(&self) -> bool {
        self.renewal_interval < Duration::from_secs(u64::from(self.lease_seconds))
    }
}

/// The single channel being monitored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub broadcaster_id: String,
    /// Also subscribe to follower notifications.
    pub follows: bool,
    /// Recent events kept in memory for the status API.
    pub event_limit: usize,
    /// Buffered push messages per downstream client before it starts skipping.
    pub push_capacity: usize,
}

impl ChannelConfig {
    pub fn new(broadcaster_id: impl Into<String>) -> Result<Self, ConfigError> {
        let broadcaster_id: String = broadcaster_id.into();
        let broadcaster_id = broadcaster_id.trim().to_string();
        if broadcaster_id.is_empty() {
            return Err(ConfigError::EmptyBroadcasterId);
        }
        Ok(Self {
            broadcaster_id,
            follows: true,
            event_limit: 200,
            push_capacity: 64,
        })
    }

    pub fn with_follows(mut self, enabled: bool) -> Self {
        self.follows = enabled;
        self
    }

    pub fn with_event_limit(mut self, limit: usize) -> Self {
        self.event_limit = limit.max(1);
        self
    }

    pub fn with_push_capacity(mut self, capacity: usize) -> Self {
        self.push_capacity = capacity.max(1);
        self
    }

    pub fn topics(&self) -> Vec<Topic> {
        let mut topics = vec![Topic::Streams {
            user_id: self.broadcaster_id.clone(),
        }];
        if self.follows {
            topics.push(Topic::Follows {
                to_id: self.broadcaster_id.clone(),
            });
        }
        topics
    }
}

/// Where and how to talk to the provider's subscription hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    pub url: String,
    pub client_id: String,
    pub token: String,
    /// Public base URL the provider calls back; a per-topic path is appended.
    pub callback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl HubConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("hub", &self.url), ("callback", &self.callback)] {
            url::Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
                field,
                value: value.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    pub fn callback_for(&self, path: &str) -> String {
        format!("{}/{}", self.callback.trim_end_matches('/'), path)
    }
}
