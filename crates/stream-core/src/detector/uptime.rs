use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Elapsed time since a stream started, split into clock fields.
///
/// Hours wrap at 24: a stream that has been live for 25 hours reports `01h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uptime {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl Uptime {
    pub fn from_secs(total: u64) -> Self {
        Self {
            hours: ((total / 3600) % 24) as u8,
            minutes: ((total / 60) % 60) as u8,
            seconds: (total % 60) as u8,
        }
    }

    pub fn hours_label(&self) -> String {
        format!("{:02}h", self.hours)
    }

    pub fn minutes_label(&self) -> String {
        format!("{:02}m", self.minutes)
    }

    pub fn seconds_label(&self) -> String {
        format!("{:02}s", self.seconds)
    }
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}h{:02}m{:02}s",
            self.hours, self.minutes, self.seconds
        )
    }
}

/// Whole seconds between `from` and `to`, truncating sub-second remainders.
/// A `to` earlier than `from` (clock skew on the provider side) counts as zero.
pub fn format_elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Uptime {
    let delta = (to - from).num_seconds().max(0) as u64;
    Uptime::from_secs(delta)
}
