use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use stream_core::{BroadcastSink, ChannelConfig, ChannelMonitor, LeaseStats};

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<ChannelMonitor>,
    pub sink: BroadcastSink,
    /// Shared secret for `X-Hub-Signature`. Unsigned callbacks are accepted when unset.
    pub secret: Option<Arc<str>>,
    /// Connected push-channel clients and when they connected.
    pub clients: Arc<DashMap<Uuid, DateTime<Utc>>>,
    pub leases: Option<Arc<LeaseStats>>,
}

impl AppState {
    /// Wire a monitor for `config` to a fresh broadcast sink.
    pub fn new(config: ChannelConfig) -> Self {
        let sink = BroadcastSink::new(config.push_capacity);
        let monitor = ChannelMonitor::new(config, Arc::new(sink.clone()));
        Self::from_parts(Arc::new(monitor), sink)
    }

    /// Use an existing monitor. `sink` must be the one the monitor emits into.
    pub fn from_parts(monitor: Arc<ChannelMonitor>, sink: BroadcastSink) -> Self {
        Self {
            monitor,
            sink,
            secret: None,
            clients: Arc::new(DashMap::new()),
            leases: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret: String = secret.into();
        self.secret = if secret.is_empty() {
            None
        } else {
            Some(Arc::from(secret))
        };
        self
    }

    pub fn with_lease_stats(mut self, stats: Arc<LeaseStats>) -> Self {
        self.leases = Some(stats);
        self
    }
}
