//! Decoding of provider notification payloads.
//!
//! Both topics deliver a `{"data": [...]}` envelope. The envelope itself must
//! be well formed or the whole payload is rejected; individual records are
//! decoded independently so one bad record never hides the others.

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use super::snapshot::UNSET_CATEGORY;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload has no `data` array")]
    MissingData,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    #[error("record {index} is not an object")]
    NotAnObject { index: usize },
    #[error("record {index} is missing field `{field}`")]
    MissingField { index: usize, field: &'static str },
    #[error("record {index} has invalid `{field}`: {value}")]
    InvalidField {
        index: usize,
        field: &'static str,
        value: String,
    },
}

/// One currently-live stream instance as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub started_at: DateTime<Utc>,
    pub title: String,
    pub category_id: i64,
}

impl StreamRecord {
    pub fn new(started_at: DateTime<Utc>, title: impl Into<String>, category_id: i64) -> Self {
        Self {
            started_at,
            title: title.into(),
            category_id,
        }
    }
}

/// A decoded stream-status notification. Entries keep their payload order.
#[derive(Debug, Clone, Default)]
pub struct NotificationBatch {
    records: Vec<Result<StreamRecord, MalformedRecord>>,
}

impl NotificationBatch {
    pub fn new(records: Vec<StreamRecord>) -> Self {
        Self {
            records: records.into_iter().map(Ok).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(records: Vec<Result<StreamRecord, MalformedRecord>>) -> Self {
        Self { records }
    }

    pub fn from_json(body: &[u8]) -> Result<Self, BatchError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, BatchError> {
        let records = data_array(value)?
            .iter()
            .enumerate()
            .map(|(index, entry)| decode_stream_record(index, entry))
            .collect();
        Ok(Self { records })
    }

    /// True when the provider reported no live instance at all.
    /// Malformed entries still count as entries.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn entries(&self) -> &[Result<StreamRecord, MalformedRecord>] {
        &self.records
    }
}

/// A new follower as reported on the follows topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRecord {
    pub from_id: String,
    pub from_name: String,
    pub followed_at: DateTime<Utc>,
}

/// Decode a follows notification. Only the most recent follower is reported,
/// so this returns the first entry, or `None` when `data` is empty.
pub fn decode_follow(body: &[u8]) -> Result<Option<Result<FollowRecord, MalformedRecord>>, BatchError> {
    let value: Value = serde_json::from_slice(body)?;
    let data = data_array(&value)?;
    Ok(data.first().map(|entry| decode_follow_record(0, entry)))
}

fn data_array(value: &Value) -> Result<&Vec<Value>, BatchError> {
    value
        .get("data")
        .and_then(Value::as_array)
        .ok_or(BatchError::MissingData)
}

fn decode_stream_record(index: usize, entry: &Value) -> Result<StreamRecord, MalformedRecord> {
    if !entry.is_object() {
        return Err(MalformedRecord::NotAnObject { index });
    }
    Ok(StreamRecord {
        started_at: timestamp_field(index, entry, "started_at")?,
        title: string_field(index, entry, "title")?,
        category_id: category_field(index, entry, "game_id")?,
    })
}

fn decode_follow_record(index: usize, entry: &Value) -> Result<FollowRecord, MalformedRecord> {
    if !entry.is_object() {
        return Err(MalformedRecord::NotAnObject { index });
    }
    Ok(FollowRecord {
        from_id: string_field(index, entry, "from_id")?,
        from_name: string_field(index, entry, "from_name")?,
        followed_at: timestamp_field(index, entry, "followed_at")?,
    })
}

fn field<'a>(index: usize, entry: &'a Value, field: &'static str) -> Result<&'a Value, MalformedRecord> {
    match entry.get(field) {
        None | Some(Value::Null) => Err(MalformedRecord::MissingField { index, field }),
        Some(v) => Ok(v),
    }
}

fn invalid(index: usize, field: &'static str, value: &Value) -> MalformedRecord {
    MalformedRecord::InvalidField {
        index,
        field,
        value: value.to_string(),
    }
}

fn string_field(index: usize, entry: &Value, name: &'static str) -> Result<String, MalformedRecord> {
    let v = field(index, entry, name)?;
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(index, name, v))
}

fn timestamp_field(
    index: usize,
    entry: &Value,
    name: &'static str,
) -> Result<DateTime<Utc>, MalformedRecord> {
    let v = field(index, entry, name)?;
    v.as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| invalid(index, name, v))
}

/// Category ids arrive as decimal strings; the empty string means "no category".
fn category_field(index: usize, entry: &Value, name: &'static str) -> Result<i64, MalformedRecord> {
    let v = field(index, entry, name)?;
    match v {
        Value::Number(n) => n.as_i64().ok_or_else(|| invalid(index, name, v)),
        Value::String(s) if s.is_empty() => Ok(UNSET_CATEGORY),
        Value::String(s) => s.parse::<i64>().map_err(|_| invalid(index, name, v)),
        _ => Err(invalid(index, name, v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn decodes_provider_stream_payload() {
        let body = json!({
            "data": [{
                "id": "0123456789",
                "user_id": "5678",
                "game_id": "21779",
                "type": "live",
                "title": "Best Stream Ever",
                "viewer_count": 417,
                "started_at": "2017-12-01T10:09:45Z",
                "language": "en"
            }]
        });
        let batch = NotificationBatch::from_value(&body).unwrap();
        assert_eq!(batch.len(), 1);
        let record = batch.entries()[0].as_ref().unwrap();
        assert_eq!(record.title, "Best Stream Ever");
        assert_eq!(record.category_id, 21779);
        assert_eq!(
            record.started_at,
            Utc.with_ymd_and_hms(2017, 12, 1, 10, 9, 45).unwrap()
        );
    }

    #[test]
    fn empty_data_is_an_empty_batch() {
        let batch = NotificationBatch::from_json(br#"{"data": []}"#).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn missing_data_is_rejected() {
        let err = NotificationBatch::from_json(br#"{"foo": 1}"#).unwrap_err();
        assert!(matches!(err, BatchError::MissingData));

        let err = NotificationBatch::from_json(br#"{"data": {}}"#).unwrap_err();
        assert!(matches!(err, BatchError::MissingData));
    }

    #[test]
    fn invalid_json_is_rejected() {
        let err = NotificationBatch::from_json(b"not json").unwrap_err();
        assert!(matches!(err, BatchError::Json(_)));
    }

    #[test]
    fn numeric_and_empty_game_ids() {
        let body = json!({
            "data": [
                {"started_at": "2019-11-26T18:00:00Z", "title": "a", "game_id": 42},
                {"started_at": "2019-11-26T18:00:00Z", "title": "b", "game_id": ""}
            ]
        });
        let batch = NotificationBatch::from_value(&body).unwrap();
        assert_eq!(batch.entries()[0].as_ref().unwrap().category_id, 42);
        assert_eq!(
            batch.entries()[1].as_ref().unwrap().category_id,
            UNSET_CATEGORY
        );
    }

    #[test]
    fn malformed_records_do_not_poison_the_batch() {
        let body = json!({
            "data": [
                "nope",
                {"title": "no start", "game_id": "1"},
                {"started_at": "yesterday", "title": "x", "game_id": "1"},
                {"started_at": "2019-11-26T18:00:00Z", "title": 7, "game_id": "1"},
                {"started_at": "2019-11-26T18:00:00Z", "title": "x", "game_id": "abc"},
                {"started_at": "2019-11-26T18:00:00Z", "title": "ok", "game_id": "1"}
            ]
        });
        let batch = NotificationBatch::from_value(&body).unwrap();
        let entries = batch.entries();
        assert_eq!(entries.len(), 6);
        assert_eq!(
            entries[0].as_ref().unwrap_err(),
            &MalformedRecord::NotAnObject { index: 0 }
        );
        assert_eq!(
            entries[1].as_ref().unwrap_err(),
            &MalformedRecord::MissingField {
                index: 1,
                field: "started_at"
            }
        );
        assert!(matches!(
            entries[2],
            Err(MalformedRecord::InvalidField { field: "started_at", .. })
        ));
        assert!(matches!(
            entries[3],
            Err(MalformedRecord::InvalidField { field: "title", .. })
        ));
        assert!(matches!(
            entries[4],
            Err(MalformedRecord::InvalidField { field: "game_id", .. })
        ));
        assert_eq!(entries[5].as_ref().unwrap().title, "ok");
    }

    #[test]
    fn decodes_first_follower_only() {
        let body = br#"{"data": [
            {"from_id": "1336", "from_name": "ebi", "to_id": "1337", "followed_at": "2017-08-22T22:55:24Z"},
            {"from_id": "9", "from_name": "older", "to_id": "1337", "followed_at": "2017-08-21T22:55:24Z"}
        ]}"#;
        let follower = decode_follow(body).unwrap().unwrap().unwrap();
        assert_eq!(follower.from_id, "1336");
        assert_eq!(follower.from_name, "ebi");
    }

    #[test]
    fn empty_follows_yields_nothing() {
        assert!(decode_follow(br#"{"data": []}"#).unwrap().is_none());
    }
}
