// Tolerant decoding of stored and remote payloads into domain models.
//
// A payload that fails to decode is treated as absent, never as an error;
// the storage key (or row key) is authoritative for the item id.

use serde_json::Value;

use super::models::ProgressRecord;

/// Parse a stored progress payload. Malformed JSON yields `None`.
pub fn parse_progress(item_id: &str, raw: &str) -> Option<ProgressRecord> {
    let record = serde_json::from_str::<ProgressRecord>(raw).ok()?;
    Some(keyed(item_id, record))
}

/// Parse a progress payload already decoded to a JSON value (remote rows).
/// `null` and malformed structures both yield `None`.
pub fn parse_progress_value(item_id: &str, value: &Value) -> Option<ProgressRecord> {
    if value.is_null() {
        return None;
    }
    let record = serde_json::from_value::<ProgressRecord>(value.clone()).ok()?;
    Some(keyed(item_id, record))
}

/// Parse the stored bookmark list. Anything but a JSON string array yields `None`.
pub fn parse_bookmark_list(raw: &str) -> Option<Vec<String>> {
    serde_json::from_str::<Vec<String>>(raw).ok()
}

pub fn progress_to_json(record: &ProgressRecord) -> anyhow::Result<String> {
    Ok(serde_json::to_string(record)?)
}

pub fn bookmark_list_to_json(ids: &[String]) -> anyhow::Result<String> {
    Ok(serde_json::to_string(ids)?)
}

fn keyed(item_id: &str, mut record: ProgressRecord) -> ProgressRecord {
    record.item_id = item_id.to_string();
    record
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_progress_full_payload() {
        let raw = r#"{
            "itemId": "book-1",
            "completed": ["seg-2", "seg-1", "seg-2"],
            "lastSegmentIndex": 3,
            "lastReadAt": "2024-01-02T09:30:00Z",
            "isCompleted": false,
            "totalSegments": 12
        }"#;
        let record = parse_progress("book-1", raw).unwrap();
        assert_eq!(record.item_id, "book-1");
        // Set semantics: the duplicate segment id collapses.
        assert_eq!(record.completed_segment_ids.len(), 2);
        assert_eq!(record.last_segment_index, 3);
        assert_eq!(
            record.last_read_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap())
        );
        assert!(!record.is_completed);
        assert_eq!(record.total_segments, Some(12));
    }

    #[test]
    fn parse_progress_defaults_missing_fields() {
        let record = parse_progress("book-2", "{}").unwrap();
        assert_eq!(record.item_id, "book-2");
        assert!(record.completed_segment_ids.is_empty());
        assert_eq!(record.last_segment_index, -1);
        assert!(record.last_read_at.is_none());
        assert!(!record.is_completed);
    }

    #[test]
    fn storage_key_overrides_embedded_item_id() {
        let record = parse_progress("book-3", r#"{"itemId": "something-else"}"#).unwrap();
        assert_eq!(record.item_id, "book-3");
    }

    #[test]
    fn malformed_progress_is_absent() {
        assert!(parse_progress("book-4", "not json {{{").is_none());
        assert!(parse_progress("book-4", r#"{"lastReadAt": "yesterday"}"#).is_none());
        assert!(parse_progress("book-4", "null").is_none());
    }

    #[test]
    fn parse_progress_value_null_is_absent() {
        assert!(parse_progress_value("book-5", &Value::Null).is_none());
        assert!(parse_progress_value("book-5", &json!({"completed": ["a"]})).is_some());
        assert!(parse_progress_value("book-5", &json!(42)).is_none());
    }

    #[test]
    fn bookmark_list_round_trip() {
        let raw = bookmark_list_to_json(&["a".into(), "b".into()]).unwrap();
        assert_eq!(parse_bookmark_list(&raw).unwrap(), vec!["a", "b"]);
        assert!(parse_bookmark_list("{\"not\": \"a list\"}").is_none());
        assert!(parse_bookmark_list("oops").is_none());
    }
}
