use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{SubscriptionTransport, Topic};
use crate::config::LeaseConfig;

#[derive(Debug, Clone, Default, Serialize)]
pub struct LeaseCounts {
    pub successes: u64,
    pub failures: u64,
    pub last_success: Option<DateTime<Utc>>,
}

/// Per-topic renewal outcomes.
#[derive(Debug, Default)]
pub struct LeaseStats {
    counts: RwLock<HashMap<String, LeaseCounts>>,
}

impl LeaseStats {
    pub async fn snapshot(&self) -> HashMap<String, LeaseCounts> {
        self.counts.read().await.clone()
    }

    async fn record(&self, topic: &Topic, ok: bool) {
        let mut counts = self.counts.write().await;
        let entry = counts.entry(topic.key().to_string()).or_default();
        if ok {
            entry.successes += 1;
            entry.last_success = Some(Utc::now());
        } else {
            entry.failures += 1;
        }
    }
}

/// Keeps hub subscriptions alive by re-subscribing every topic on its own timer.
pub struct LeaseManager {
    transport: Arc<dyn SubscriptionTransport>,
    interval: Duration,
    shutdown_timeout: Duration,
    stats: Arc<LeaseStats>,
    tasks: Mutex<Vec<(Topic, JoinHandle<()>)>>,
}

impl LeaseManager {
    pub fn new(transport: Arc<dyn SubscriptionTransport>, config: &LeaseConfig) -> Self {
        Self {
            transport,
            interval: config.renewal_interval,
            shutdown_timeout: config.shutdown_timeout,
            stats: Arc::new(LeaseStats::default()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stats(&self) -> Arc<LeaseStats> {
        Arc::clone(&self.stats)
    }

    pub async fn scheduled_topics(&self) -> Vec<Topic> {
        self.tasks.lock().await.iter().map(|(t, _)| t.clone()).collect()
    }

    /// Subscribe each topic now and then every `interval`. Topics run on
    /// independent timers; one already scheduled is left alone.
    pub async fn schedule_renewals(&self, topics: impl IntoIterator<Item = Topic>) {
        let mut tasks = self.tasks.lock().await;
        for topic in topics {
            if tasks.iter().any(|(t, _)| *t == topic) {
                debug!(topic = %topic, "Renewal already scheduled");
                continue;
            }

            info!(
                topic = %topic,
                interval_secs = self.interval.as_secs(),
                "Scheduling lease renewal"
            );
            let handle = spawn_renewal_timer(
                topic.clone(),
                Arc::clone(&self.transport),
                Arc::clone(&self.stats),
                self.interval,
            );
            tasks.push((topic, handle));
        }
    }

    /// Stop renewing and make one bounded attempt to unsubscribe everything.
    pub async fn shutdown(&self) {
        let topics: Vec<Topic> = {
            let mut tasks = self.tasks.lock().await;
            tasks
                .drain(..)
                .map(|(topic, handle)| {
                    handle.abort();
                    topic
                })
                .collect()
        };

        if topics.is_empty() {
            return;
        }

        info!(count = topics.len(), "Unsubscribing from hub topics");
        let unsubscribe_all = join_all(topics.iter().map(|topic| {
            let transport = Arc::clone(&self.transport);
            async move {
                if let Err(e) = transport.unsubscribe(topic).await {
                    warn!(topic = %topic, error = %e, "Unsubscribe failed");
                }
            }
        }));

        if tokio::time::timeout(self.shutdown_timeout, unsubscribe_all)
            .await
            .is_err()
        {
            warn!(
                timeout_ms = self.shutdown_timeout.as_millis() as u64,
                "Unsubscribe did not finish in time, giving up"
            );
        }
    }
}

fn spawn_renewal_timer(
    topic: Topic,
    transport: Arc<dyn SubscriptionTransport>,
    stats: Arc<LeaseStats>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            // Detached so a slow hub never pushes back the next tick.
            let transport = Arc::clone(&transport);
            let stats = Arc::clone(&stats);
            let topic = topic.clone();
            tokio::spawn(async move {
                renew(transport.as_ref(), &topic, &stats).await;
            });
        }
    })
}

/// One subscribe attempt. Failures are logged and counted, never propagated.
pub async fn renew(transport: &dyn SubscriptionTransport, topic: &Topic, stats: &LeaseStats) {
    match transport.subscribe(topic).await {
        Ok(()) => {
            debug!(topic = %topic, "Lease renewed");
            stats.record(topic, true).await;
        }
        Err(e) => {
            warn!(topic = %topic, error = %e, "Lease renewal failed, retrying next tick");
            stats.record(topic, false).await;
        }
    }
}
