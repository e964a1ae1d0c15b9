//! The serialized owner of the channel snapshot.
//!
//! Callbacks may arrive concurrently from the HTTP layer. [`ChannelMonitor`]
//! runs each batch through the detector under a single lock and hands the
//! resulting events to an [`EventSink`] in the same order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::detector::{
    ChangeDetector, Emission, EventRing, FollowRecord, MalformedRecord, NotificationBatch,
    RecordedEvent, SnapshotStatus, StreamEvent,
};

/// Source of "now" for offline timestamps and uptime.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: StdMutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: StdMutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Downstream fan-out. Emission is best-effort and must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, emission: &Emission);
}

/// Fans emissions out to every connected push-channel client.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Emission>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Emission> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, emission: &Emission) {
        // No receivers is not an error: nobody is listening right now.
        if self.tx.send(emission.clone()).is_err() {
            debug!(event = %emission.event, "No push clients connected");
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelStats {
    pub batches: u64,
    pub follow_notifications: u64,
    pub malformed_records: u64,
    pub emitted: HashMap<String, u64>,
}

struct ChannelState {
    detector: ChangeDetector,
    events: EventRing,
    stats: ChannelStats,
}

pub struct ChannelMonitor {
    config: ChannelConfig,
    state: Mutex<ChannelState>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    created_at: DateTime<Utc>,
}

impl ChannelMonitor {
    pub fn new(config: ChannelConfig, sink: Arc<dyn EventSink>) -> Self {
        let events = EventRing::new(config.event_limit);
        Self {
            config,
            state: Mutex::new(ChannelState {
                detector: ChangeDetector::new(),
                events,
                stats: ChannelStats::default(),
            }),
            sink,
            clock: Arc::new(SystemClock),
            created_at: Utc::now(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn broadcaster_id(&self) -> &str {
        &self.config.broadcaster_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Process one stream-status notification. Batches are applied strictly
    /// one at a time, in the order their callers acquire the lock.
    pub async fn handle_streams(&self, batch: &NotificationBatch) -> Vec<StreamEvent> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        state.stats.batches += 1;
        state.stats.malformed_records +=
            batch.entries().iter().filter(|e| e.is_err()).count() as u64;

        let events = state.detector.process_batch(batch, now);
        self.publish(&mut state, &events, now);
        events
    }

    /// Process one follows notification. Never touches the stream snapshot.
    pub async fn handle_follow(
        &self,
        entry: Option<Result<FollowRecord, MalformedRecord>>,
    ) -> Vec<StreamEvent> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        state.stats.follow_notifications += 1;

        let follower = match entry {
            None => return Vec::new(),
            Some(Err(e)) => {
                warn!(error = %e, "Skipping malformed follower record");
                state.stats.malformed_records += 1;
                return Vec::new();
            }
            Some(Ok(f)) => f,
        };

        info!(
            follower_id = %follower.from_id,
            follower_name = %follower.from_name,
            followed_at = %follower.followed_at,
            "New follower"
        );
        let events = vec![StreamEvent::NewFollower {
            id: follower.from_id,
            name: follower.from_name,
            followed_at: follower.followed_at,
        }];
        self.publish(&mut state, &events, now);
        events
    }

    fn publish(&self, state: &mut ChannelState, events: &[StreamEvent], now: DateTime<Utc>) {
        for event in events {
            state.events.push(RecordedEvent::new(event.clone(), now));
            for emission in event.emissions() {
                *state.stats.emitted.entry(emission.event.clone()).or_insert(0) += 1;
                self.sink.emit(&emission);
            }
        }
    }

    pub async fn status(&self) -> SnapshotStatus {
        let state = self.state.lock().await;
        state.detector.snapshot().status(self.clock.now())
    }

    /// Newest first.
    pub async fn recent_events(&self) -> Vec<RecordedEvent> {
        self.state.lock().await.events.list()
    }

    pub async fn stats(&self) -> ChannelStats {
        self.state.lock().await.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{LiveState, StreamRecord};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        seen: StdMutex<Vec<Emission>>,
    }

    impl RecordingSink {
        fn names(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.event.clone())
                .collect()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, emission: &Emission) {
            self.seen.lock().unwrap().push(emission.clone());
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 11, 26, 18, 0, 0).unwrap()
    }

    fn monitor(sink: Arc<RecordingSink>, clock: Arc<ManualClock>) -> ChannelMonitor {
        ChannelMonitor::new(ChannelConfig::new("1337").unwrap(), sink).with_clock(clock)
    }

    #[tokio::test]
    async fn full_lifecycle_emits_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let m = monitor(sink.clone(), clock.clone());

        m.handle_streams(&NotificationBatch::new(vec![StreamRecord::new(t0(), "A", 5)]))
            .await;
        m.handle_streams(&NotificationBatch::new(vec![StreamRecord::new(t0(), "B", 6)]))
            .await;
        clock.advance(Duration::seconds(3725));
        m.handle_streams(&NotificationBatch::empty()).await;

        assert_eq!(
            sink.names(),
            vec![
                "new_stream",
                "category_change",
                "title_change",
                "stream_offline",
                "stream_uptime"
            ]
        );
        let seen = sink.seen.lock().unwrap().clone();
        assert_eq!(seen[4].data, json!("01h02m05s"));

        let status = m.status().await;
        assert_eq!(status.state, LiveState::Offline);
        assert_eq!(status.title, "B");
        assert_eq!(status.category_id, 6);
    }

    #[tokio::test]
    async fn follower_goes_out_as_three_messages() {
        let sink = Arc::new(RecordingSink::default());
        let m = monitor(sink.clone(), Arc::new(ManualClock::new(t0())));

        let events = m
            .handle_follow(Some(Ok(FollowRecord {
                from_id: "1336".into(),
                from_name: "ebi".into(),
                followed_at: t0(),
            })))
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            sink.names(),
            vec!["new_follower_id", "new_follower_name", "new_follower_at"]
        );
        assert_eq!(m.status().await.state, LiveState::Offline);
    }

    #[tokio::test]
    async fn malformed_follower_is_counted_and_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let m = monitor(sink.clone(), Arc::new(ManualClock::new(t0())));

        let events = m
            .handle_follow(Some(Err(MalformedRecord::NotAnObject { index: 0 })))
            .await;
        assert!(events.is_empty());
        assert!(m.handle_follow(None).await.is_empty());
        assert!(sink.names().is_empty());

        let stats = m.stats().await;
        assert_eq!(stats.follow_notifications, 2);
        assert_eq!(stats.malformed_records, 1);
    }

    #[tokio::test]
    async fn records_recent_events_and_counts() {
        let sink = Arc::new(RecordingSink::default());
        let m = monitor(sink, Arc::new(ManualClock::new(t0())));

        let batch = NotificationBatch::from_entries(vec![
            Err(MalformedRecord::NotAnObject { index: 0 }),
            Ok(StreamRecord::new(t0(), "A", 5)),
        ]);
        m.handle_streams(&batch).await;
        m.handle_streams(&batch).await;

        let recent = m.recent_events().await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event, StreamEvent::NewStream { started_at: t0() });

        let stats = m.stats().await;
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.malformed_records, 2);
        assert_eq!(stats.emitted["new_stream"], 1);
    }

    #[tokio::test]
    async fn concurrent_batches_are_serialized() {
        let sink = Arc::new(RecordingSink::default());
        let m = Arc::new(monitor(sink.clone(), Arc::new(ManualClock::new(t0()))));

        let mut handles = Vec::new();
        for i in 0..16 {
            let m = Arc::clone(&m);
            handles.push(tokio::spawn(async move {
                let batch = if i % 2 == 0 {
                    NotificationBatch::new(vec![StreamRecord::new(t0(), "A", 5)])
                } else {
                    NotificationBatch::empty()
                };
                m.handle_streams(&batch).await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Every online transition is followed by exactly one offline pair.
        let names = sink.names();
        let mut live = false;
        for name in &names {
            match name.as_str() {
                "new_stream" => {
                    assert!(!live);
                    live = true;
                }
                "stream_offline" => {
                    assert!(live);
                    live = false;
                }
                "stream_uptime" => assert!(!live),
                other => panic!("unexpected event {}", other),
            }
        }
    }

    #[tokio::test]
    async fn broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        assert_eq!(sink.receiver_count(), 1);

        sink.emit(&Emission::new("title_change", json!("B")));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.event, "title_change");
        assert_eq!(got.data, json!("B"));
    }

    #[test]
    fn broadcast_sink_without_subscribers_does_not_fail() {
        let sink = BroadcastSink::new(8);
        sink.emit(&Emission::new("new_stream", json!("x")));
        assert_eq!(sink.receiver_count(), 0);
    }
}
