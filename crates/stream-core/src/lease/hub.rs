use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use super::{HubMode, SubscribeError, SubscriptionTransport, Topic};
use crate::config::{HubConfig, LeaseConfig};

/// WebSub hub client. One attempt per call; the next renewal tick is the retry.
#[derive(Debug, Clone)]
pub struct HubTransport {
    client: Client,
    hub: HubConfig,
    lease_seconds: u32,
}

impl HubTransport {
    pub fn new(hub: HubConfig, lease: &LeaseConfig) -> Self {
        Self::with_client(Self::build_client(lease.request_timeout), hub, lease)
    }

    pub fn with_client(client: Client, hub: HubConfig, lease: &LeaseConfig) -> Self {
        Self {
            client,
            hub,
            lease_seconds: lease.lease_seconds,
        }
    }

    pub fn build_client(timeout: Duration) -> Client {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client")
    }

    fn request_body(&self, topic: &Topic, mode: HubMode) -> serde_json::Value {
        let mut body = json!({
            "hub.callback": self.hub.callback_for(topic.key()),
            "hub.mode": mode.as_str(),
            "hub.topic": topic.url(),
            "hub.lease_seconds": self.lease_seconds,
        });
        if let Some(secret) = &self.hub.secret {
            body["hub.secret"] = json!(secret);
        }
        body
    }

    async fn send(&self, topic: &Topic, mode: HubMode) -> Result<(), SubscribeError> {
        let resp = self
            .client
            .post(&self.hub.url)
            .header("Client-ID", &self.hub.client_id)
            .bearer_auth(&self.hub.token)
            .json(&self.request_body(topic, mode))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubscribeError::Timeout {
                        topic: topic.key().to_string(),
                        mode: mode.as_str(),
                    }
                } else {
                    SubscribeError::Network {
                        topic: topic.key().to_string(),
                        mode: mode.as_str(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SubscribeError::Http {
                topic: topic.key().to_string(),
                mode: mode.as_str(),
                status: status.as_u16(),
            });
        }

        debug!(topic = %topic, mode = mode.as_str(), status = status.as_u16(), "Hub accepted request");
        Ok(())
    }
}

#[async_trait]
impl SubscriptionTransport for HubTransport {
    async fn subscribe(&self, topic: &Topic) -> Result<(), SubscribeError> {
        self.send(topic, HubMode::Subscribe).await
    }

    async fn unsubscribe(&self, topic: &Topic) -> Result<(), SubscribeError> {
        self.send(topic, HubMode::Unsubscribe).await
    }
}
