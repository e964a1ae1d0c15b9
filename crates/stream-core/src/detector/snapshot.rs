use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::uptime::format_elapsed;

/// Category id meaning "no category observed yet".
pub const UNSET_CATEGORY: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveState {
    Offline,
    Online,
}

impl fmt::Display for LiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::Online => write!(f, "online"),
        }
    }
}

/// The detector's belief about the channel.
///
/// `started_at` is `None` exactly when the channel is believed offline.
/// `title` and `category_id` keep their last observed values while offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub title: String,
    pub category_id: i64,
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for StreamSnapshot {
    fn default() -> Self {
        Self {
            title: String::new(),
            category_id: UNSET_CATEGORY,
            started_at: None,
        }
    }
}

impl StreamSnapshot {
    pub fn state(&self) -> LiveState {
        match self.started_at {
            Some(_) => LiveState::Online,
            None => LiveState::Offline,
        }
    }

    pub fn is_live(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn status(&self, now: DateTime<Utc>) -> SnapshotStatus {
        SnapshotStatus {
            state: self.state(),
            started_at: self.started_at,
            title: self.title.clone(),
            category_id: self.category_id,
            uptime: self.started_at.map(|s| format_elapsed(s, now).to_string()),
        }
    }
}

/// Serializable view of a [`StreamSnapshot`] for status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotStatus {
    pub state: LiveState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub title: String,
    pub category_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
}
