#![forbid(unsafe_code)]

pub mod channel;
pub mod config;
pub mod detector;
pub mod lease;
pub mod signature;

pub use channel::{
    BroadcastSink, ChannelMonitor, ChannelStats, Clock, EventSink, ManualClock, SystemClock,
};
pub use config::{ChannelConfig, ConfigError, HubConfig, LeaseConfig};
pub use detector::{
    decode_follow, format_elapsed, BatchError, ChangeDetector, Emission, EventRing, FollowRecord,
    LiveState, MalformedRecord, NotificationBatch, RecordedEvent, SnapshotStatus, StreamEvent,
    StreamRecord, StreamSnapshot, Uptime, UNSET_CATEGORY,
};
pub use lease::{
    HubMode, HubTransport, LeaseCounts, LeaseManager, LeaseStats, SubscribeError,
    SubscriptionTransport, Topic,
};
pub use signature::{SignatureError, SIGNATURE_HEADER};
