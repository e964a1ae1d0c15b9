use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::batch::{NotificationBatch, StreamRecord};
use super::event::StreamEvent;
use super::snapshot::StreamSnapshot;
use super::uptime::format_elapsed;

/// Owns the channel snapshot and turns notification batches into events.
///
/// Not synchronized: callers that receive batches concurrently must serialize
/// access (see [`crate::channel::ChannelMonitor`]).
#[derive(Debug, Default)]
pub struct ChangeDetector {
    snapshot: StreamSnapshot,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: StreamSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &StreamSnapshot {
        &self.snapshot
    }

    pub fn process_batch(&mut self, batch: &NotificationBatch, now: DateTime<Utc>) -> Vec<StreamEvent> {
        process_batch(batch, &mut self.snapshot, now)
    }
}

/// Diff `batch` against `snapshot`, update it in place and return the events
/// in emission order.
pub fn process_batch(
    batch: &NotificationBatch,
    snapshot: &mut StreamSnapshot,
    now: DateTime<Utc>,
) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if batch.is_empty() {
        if let Some(started_at) = snapshot.started_at.take() {
            let uptime = format_elapsed(started_at, now);
            info!(offline_at = %now, %uptime, "Stream went offline");
            events.push(StreamEvent::StreamOffline { at: now });
            events.push(StreamEvent::StreamUptime { uptime });
        }
        return events;
    }

    for entry in batch.entries() {
        match entry {
            Ok(record) => diff_record(record, snapshot, now, &mut events),
            Err(e) => warn!(error = %e, "Skipping malformed stream record"),
        }
    }

    events
}

fn diff_record(
    record: &StreamRecord,
    snapshot: &mut StreamSnapshot,
    now: DateTime<Utc>,
    events: &mut Vec<StreamEvent>,
) {
    if snapshot.started_at != Some(record.started_at) {
        info!(
            started_at = %record.started_at,
            category_id = record.category_id,
            title = %record.title,
            "Stream started"
        );
        events.push(StreamEvent::NewStream {
            started_at: record.started_at,
        });
        snapshot.started_at = Some(record.started_at);
        snapshot.title = record.title.clone();
        snapshot.category_id = record.category_id;
        return;
    }

    if snapshot.category_id != record.category_id {
        let vod_mark = format_elapsed(record.started_at, now);
        info!(category_id = record.category_id, %vod_mark, "Category changed");
        events.push(StreamEvent::CategoryChange {
            category_id: record.category_id,
        });
        snapshot.category_id = record.category_id;
    }

    if snapshot.title != record.title {
        let vod_mark = format_elapsed(record.started_at, now);
        info!(title = %record.title, %vod_mark, "Title changed");
        events.push(StreamEvent::TitleChange {
            title: record.title.clone(),
        });
        snapshot.title = record.title.clone();
    }
}
