mod hub;
mod manager;

pub use hub::HubTransport;
pub use manager::{renew, LeaseCounts, LeaseManager, LeaseStats};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const HELIX_BASE: &str = "https://api.twitch.tv/helix";

/// An upstream notification topic the hub can deliver callbacks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topic {
    /// Live/offline status, title and category of a channel.
    Streams { user_id: String },
    /// Most recent follower of a channel.
    Follows { to_id: String },
}

impl Topic {
    /// Short name, also used as the callback path segment.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Streams { .. } => "streams",
            Self::Follows { .. } => "follows",
        }
    }

    /// The topic URL the hub expects in `hub.topic`.
    pub fn url(&self) -> String {
        let (path, params): (&str, Vec<(&str, &str)>) = match self {
            Self::Streams { user_id } => ("streams", vec![("user_id", user_id.as_str())]),
            Self::Follows { to_id } => (
                "users/follows",
                vec![("first", "1"), ("to_id", to_id.as_str())],
            ),
        };
        let base = format!("{}/{}", HELIX_BASE, path);
        match url::Url::parse_with_params(&base, params) {
            Ok(u) => u.to_string(),
            Err(_) => base,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubMode {
    Subscribe,
    Unsubscribe,
}

impl HubMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("hub rejected {mode} for {topic}: HTTP {status}")]
    Http {
        topic: String,
        mode: &'static str,
        status: u16,
    },
    #[error("network error during {mode} for {topic}: {reason}")]
    Network {
        topic: String,
        mode: &'static str,
        reason: String,
    },
    #[error("{mode} for {topic} timed out")]
    Timeout { topic: String, mode: &'static str },
}

/// The outbound side of the subscription handshake.
///
/// Calls are fire-and-forget from the caller's point of view: re-subscribing
/// an existing topic just extends its lease.
#[async_trait]
pub trait SubscriptionTransport: Send + Sync {
    async fn subscribe(&self, topic: &Topic) -> Result<(), SubscribeError>;
    async fn unsubscribe(&self, topic: &Topic) -> Result<(), SubscribeError>;
}
