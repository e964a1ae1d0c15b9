pub mod batch;
pub mod engine;
pub mod event;
pub mod snapshot;
pub mod uptime;

pub use batch::{decode_follow, BatchError, FollowRecord, MalformedRecord, NotificationBatch, StreamRecord};
pub use engine::{process_batch, ChangeDetector};
pub use event::{Emission, EventRing, RecordedEvent, StreamEvent};
pub use snapshot::{LiveState, SnapshotStatus, StreamSnapshot, UNSET_CATEGORY};
pub use uptime::{format_elapsed, Uptime};
