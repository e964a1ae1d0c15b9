use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::uptime::Uptime;

/// A semantic change detected on the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    NewStream { started_at: DateTime<Utc> },
    TitleChange { title: String },
    CategoryChange { category_id: i64 },
    StreamOffline { at: DateTime<Utc> },
    StreamUptime { uptime: Uptime },
    NewFollower {
        id: String,
        name: String,
        followed_at: DateTime<Utc>,
    },
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewStream { .. } => "new_stream",
            Self::TitleChange { .. } => "title_change",
            Self::CategoryChange { .. } => "category_change",
            Self::StreamOffline { .. } => "stream_offline",
            Self::StreamUptime { .. } => "stream_uptime",
            Self::NewFollower { .. } => "new_follower",
        }
    }

    /// The named messages pushed to downstream clients for this event.
    pub fn emissions(&self) -> Vec<Emission> {
        match self {
            Self::NewStream { started_at } => vec![Emission::new(
                "new_stream",
                json!(started_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            )],
            Self::TitleChange { title } => vec![Emission::new("title_change", json!(title))],
            Self::CategoryChange { category_id } => {
                vec![Emission::new("category_change", json!(category_id))]
            }
            Self::StreamOffline { at } => vec![Emission::new(
                "stream_offline",
                json!(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            )],
            Self::StreamUptime { uptime } => {
                vec![Emission::new("stream_uptime", json!(uptime.to_string()))]
            }
            Self::NewFollower {
                id,
                name,
                followed_at,
            } => vec![
                Emission::new("new_follower_id", json!(id)),
                Emission::new("new_follower_name", json!(name)),
                Emission::new(
                    "new_follower_at",
                    json!(followed_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ),
            ],
        }
    }
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewStream { started_at } => write!(f, "stream started at {}", started_at),
            Self::TitleChange { title } => write!(f, "title changed to {:?}", title),
            Self::CategoryChange { category_id } => {
                write!(f, "category changed to {}", category_id)
            }
            Self::StreamOffline { at } => write!(f, "stream went offline at {}", at),
            Self::StreamUptime { uptime } => write!(f, "up for {}", uptime),
            Self::NewFollower { id, name, .. } => write!(f, "new follower {} ({})", name, id),
        }
    }
}

/// A single named message on the push channel: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emission {
    pub event: String,
    pub data: Value,
}

impl Emission {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: StreamEvent,
}

impl RecordedEvent {
    pub fn new(event: StreamEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp,
            event,
        }
    }
}

/// Fixed-capacity circular buffer for recent events. O(1) insert, evicts oldest when full.
#[derive(Debug, Clone)]
pub struct EventRing {
    buffer: VecDeque<RecordedEvent>,
    capacity: usize,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, event: RecordedEvent) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    /// Newest first.
    pub fn list(&self) -> Vec<RecordedEvent> {
        self.buffer.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
