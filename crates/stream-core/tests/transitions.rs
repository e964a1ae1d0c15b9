use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use stream_core::{
    decode_follow, ChannelConfig, ChannelMonitor, Emission, EventSink, LiveState, ManualClock,
    NotificationBatch,
};

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Emission>>,
}

impl Recorder {
    fn drain(&self) -> Vec<(String, Value)> {
        self.seen
            .lock()
            .unwrap()
            .drain(..)
            .map(|e| (e.event, e.data))
            .collect()
    }
}

impl EventSink for Recorder {
    fn emit(&self, emission: &Emission) {
        self.seen.lock().unwrap().push(emission.clone());
    }
}

const STARTED: &str = "2019-11-26T18:00:00Z";
const RESTARTED: &str = "2019-11-26T21:30:00Z";

fn started() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 11, 26, 18, 0, 0).unwrap()
}

fn record(started_at: &str, title: &str, game_id: Value) -> Value {
    json!({
        "id": "0123456789",
        "user_id": "1337",
        "user_name": "wjdtkdqhs",
        "game_id": game_id,
        "type": "live",
        "title": title,
        "viewer_count": 417,
        "started_at": started_at,
        "language": "en",
        "thumbnail_url": "https://static-cdn.jtvnw.net/previews-ttv/live_user_wjdtkdqhs-{width}x{height}.jpg"
    })
}

fn payload(records: Vec<Value>) -> Vec<u8> {
    serde_json::to_vec(&json!({ "data": records })).unwrap()
}

struct Harness {
    monitor: ChannelMonitor,
    sink: Arc<Recorder>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        let sink = Arc::new(Recorder::default());
        let clock = Arc::new(ManualClock::new(started()));
        let monitor = ChannelMonitor::new(ChannelConfig::new("1337").unwrap(), sink.clone())
            .with_clock(clock.clone());
        Self {
            monitor,
            sink,
            clock,
        }
    }

    async fn deliver(&self, body: &[u8]) -> Vec<(String, Value)> {
        let batch = NotificationBatch::from_json(body).unwrap();
        self.monitor.handle_streams(&batch).await;
        self.sink.drain()
    }

    fn names(emitted: &[(String, Value)]) -> Vec<&str> {
        emitted.iter().map(|(n, _)| n.as_str()).collect()
    }
}

#[tokio::test]
async fn go_live_change_things_and_go_offline() {
    let h = Harness::new();

    let out = h
        .deliver(&payload(vec![record(STARTED, "Morning chess", json!("33214"))]))
        .await;
    assert_eq!(Harness::names(&out), vec!["new_stream"]);
    assert_eq!(out[0].1, json!("2019-11-26T18:00:00Z"));

    // Duplicate delivery of the same state.
    h.clock.advance(Duration::minutes(5));
    let out = h
        .deliver(&payload(vec![record(STARTED, "Morning chess", json!("33214"))]))
        .await;
    assert!(out.is_empty());

    h.clock.advance(Duration::minutes(10));
    let out = h
        .deliver(&payload(vec![record(STARTED, "Morning chess", json!("509658"))]))
        .await;
    assert_eq!(out, vec![("category_change".to_string(), json!(509658))]);

    let out = h
        .deliver(&payload(vec![record(STARTED, "Speedruns", json!("509658"))]))
        .await;
    assert_eq!(out, vec![("title_change".to_string(), json!("Speedruns"))]);

    let out = h
        .deliver(&payload(vec![record(STARTED, "Chess again", json!(33214))]))
        .await;
    assert_eq!(
        Harness::names(&out),
        vec!["category_change", "title_change"]
    );

    h.clock.set(started() + Duration::seconds(3725) + Duration::milliseconds(250));
    let out = h.deliver(&payload(vec![])).await;
    assert_eq!(
        out,
        vec![
            (
                "stream_offline".to_string(),
                json!("2019-11-26T19:02:05.250Z")
            ),
            ("stream_uptime".to_string(), json!("01h02m05s")),
        ]
    );

    let status = h.monitor.status().await;
    assert_eq!(status.state, LiveState::Offline);
    assert_eq!(status.title, "Chess again");
    assert_eq!(status.category_id, 33214);
}

#[tokio::test]
async fn repeated_offline_notifications_are_silent() {
    let h = Harness::new();
    assert!(h.deliver(&payload(vec![])).await.is_empty());

    h.deliver(&payload(vec![record(STARTED, "t", json!("1"))]))
        .await;
    assert_eq!(h.deliver(&payload(vec![])).await.len(), 2);
    assert!(h.deliver(&payload(vec![])).await.is_empty());
}

#[tokio::test]
async fn restart_is_a_new_stream_without_intermediate_offline() {
    let h = Harness::new();
    h.deliver(&payload(vec![record(STARTED, "First", json!("1"))]))
        .await;

    let out = h
        .deliver(&payload(vec![record(RESTARTED, "Second", json!("2"))]))
        .await;
    assert_eq!(out, vec![("new_stream".to_string(), json!(RESTARTED))]);

    // The resync took the new title and category without emitting them.
    let out = h
        .deliver(&payload(vec![record(RESTARTED, "Second", json!("2"))]))
        .await;
    assert!(out.is_empty());
}

#[tokio::test]
async fn empty_category_is_unset() {
    let h = Harness::new();
    h.deliver(&payload(vec![record(STARTED, "t", json!(""))]))
        .await;
    assert_eq!(h.monitor.status().await.category_id, -1);

    let out = h
        .deliver(&payload(vec![record(STARTED, "t", json!("21779"))]))
        .await;
    assert_eq!(out, vec![("category_change".to_string(), json!(21779))]);
}

#[tokio::test]
async fn malformed_record_does_not_abort_the_batch() {
    let h = Harness::new();
    let body = payload(vec![
        json!({ "title": "no start time", "game_id": "1" }),
        record(STARTED, "t", json!("1")),
    ]);
    let out = h.deliver(&body).await;
    assert_eq!(Harness::names(&out), vec!["new_stream"]);
    assert_eq!(h.monitor.stats().await.malformed_records, 1);
}

#[tokio::test]
async fn uptime_hours_wrap_past_a_day() {
    let h = Harness::new();
    h.deliver(&payload(vec![record(STARTED, "t", json!("1"))]))
        .await;

    h.clock.advance(Duration::hours(25) + Duration::seconds(7));
    let out = h.deliver(&payload(vec![])).await;
    assert_eq!(out[1], ("stream_uptime".to_string(), json!("01h00m07s")));
}

#[tokio::test]
async fn follower_notifications_leave_the_stream_alone() {
    let h = Harness::new();
    h.deliver(&payload(vec![record(STARTED, "t", json!("1"))]))
        .await;

    let body = serde_json::to_vec(&json!({
        "data": [
            {
                "from_id": "1336",
                "from_name": "ebi",
                "to_id": "1337",
                "to_name": "wjdtkdqhs",
                "followed_at": "2019-11-26T19:12:45Z"
            },
            {
                "from_id": "1335",
                "from_name": "older",
                "to_id": "1337",
                "to_name": "wjdtkdqhs",
                "followed_at": "2019-11-25T10:00:00Z"
            }
        ]
    }))
    .unwrap();
    h.monitor
        .handle_follow(decode_follow(&body).unwrap())
        .await;

    let out = h.sink.drain();
    assert_eq!(
        out,
        vec![
            ("new_follower_id".to_string(), json!("1336")),
            ("new_follower_name".to_string(), json!("ebi")),
            ("new_follower_at".to_string(), json!("2019-11-26T19:12:45Z")),
        ]
    );
    assert_eq!(h.monitor.status().await.state, LiveState::Online);

    let recent = h.monitor.recent_events().await;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].event.name(), "new_follower");
}

#[test]
fn garbage_body_is_rejected_before_reaching_the_detector() {
    assert!(NotificationBatch::from_json(b"not json").is_err());
    assert!(NotificationBatch::from_json(b"{\"items\": []}").is_err());
    assert!(NotificationBatch::from_json(b"{\"data\": {}}").is_err());
}
