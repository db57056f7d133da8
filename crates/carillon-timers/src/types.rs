//! Persisted record shapes and the scan entry.
//!
//! The JSON field names are wire contracts shared with every writer of the
//! bucket; do not rename them.

use carillon_core::Cas;
use serde::Deserialize;
use serde::Serialize;

/// Persisted alarm half of a timer.
///
/// Lives at `..:al:{dueBase36}:{seq}` and points at its context record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    /// When the alarm fires, seconds since the epoch, bucket-aligned.
    #[serde(rename = "due")]
    pub alarm_due: i64,
    /// Key of the paired context record.
    #[serde(rename = "cxr")]
    pub context_ref: String,
}

/// Persisted context half of a timer.
///
/// Lives at `..:cx:{hash27}` under the caller's reference and points back
/// at the alarm record. A context whose `alarm_ref` no longer matches an
/// alarm's key supersedes that alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    /// Caller-supplied payload, opaque to the store.
    #[serde(rename = "ctx")]
    pub context: serde_json::Value,
    /// Key of the paired alarm record.
    #[serde(rename = "alr")]
    pub alarm_ref: String,
}

/// The `[start, stop]` envelope of buckets believed to hold live alarms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// First occupied bucket, inclusive.
    #[serde(rename = "sta")]
    pub start: i64,
    /// Last occupied bucket, inclusive.
    #[serde(rename = "stp")]
    pub stop: i64,
}

/// A live timer yielded by the scan iterator.
///
/// Carries both persisted halves plus the CAS tokens
/// [`crate::TimerStore::delete`] needs to clean up safely.
#[derive(Debug, Clone)]
pub struct TimerEntry {
    /// When the alarm fires, seconds since the epoch.
    pub alarm_due: i64,
    /// Key of the alarm record.
    pub alarm_ref: String,
    /// Key of the context record.
    pub context_ref: String,
    /// Caller-supplied payload.
    pub context: serde_json::Value,
    /// Sequence of the alarm within its bucket.
    pub(crate) alarm_seq: i64,
    /// CAS of the context record at scan time.
    pub(crate) ctx_cas: Cas,
    /// CAS of the bucket's root counter; non-none only for the last column
    /// of a row, authorizing root cleanup on delete.
    pub(crate) top_cas: Cas,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn alarm_record_wire_shape() {
        let record = AlarmRecord {
            alarm_due: 1050,
            context_ref: "u:tm:0:cx:abc".to_string(),
        };
        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded, json!({"due": 1050, "cxr": "u:tm:0:cx:abc"}));
        let decoded: AlarmRecord = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn context_record_wire_shape() {
        let record = ContextRecord {
            context: json!({"n": 1}),
            alarm_ref: "u:tm:0:al:t6:128".to_string(),
        };
        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded, json!({"ctx": {"n": 1}, "alr": "u:tm:0:al:t6:128"}));
    }

    #[test]
    fn span_wire_shape() {
        let span = Span { start: 700, stop: 1400 };
        let encoded = serde_json::to_string(&span).unwrap();
        assert_eq!(encoded, r#"{"sta":700,"stp":1400}"#);
        let decoded: Span = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, span);
    }

    #[test]
    fn null_context_round_trips() {
        let record = ContextRecord {
            context: serde_json::Value::Null,
            alarm_ref: "a".to_string(),
        };
        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: ContextRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }
}
