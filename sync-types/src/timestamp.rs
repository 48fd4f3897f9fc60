//! ISO-8601 timestamp helpers.
//!
//! Records carry client-supplied wall-clock timestamps that drive
//! last-write-wins. Peers may write them with any UTC offset, or (older
//! clients) as epoch milliseconds, and some records have none at all.
//! The [`lenient`] serde module normalises all of these to
//! `Option<DateTime<Utc>>`: anything that cannot be read as an instant
//! becomes `None` ("no usable timestamp") instead of failing the whole
//! payload. Such values are logged, since re-serializing the record
//! drops them.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// Format an instant the way it goes on the wire.
///
/// Sub-second digits are only emitted when present, so a value read
/// back with [`parse`] is the same instant.
pub fn format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an ISO-8601 / RFC 3339 string with any offset into UTC.
pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

/// Serde adapter for optional conflict timestamps.
///
/// Use with `#[serde(default, skip_serializing_if = "Option::is_none", with = "lenient")]`.
pub mod lenient {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as an RFC 3339 string, or `null` when absent.
    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&format(ts)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize from a string, epoch millis, or anything else (→ `None`).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        let parsed = raw.as_ref().and_then(from_value);
        if let (None, Some(value)) = (parsed, raw.as_ref().filter(|v| !v.is_null())) {
            tracing::warn!(value = %value, "unreadable timestamp treated as absent");
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Holder {
        #[serde(default, skip_serializing_if = "Option::is_none", with = "lenient")]
        at: Option<DateTime<Utc>>,
    }

    #[test]
    fn offsets_normalise_to_the_same_instant() {
        let utc = parse("2024-03-01T10:00:00Z").unwrap();
        let plus_two = parse("2024-03-01T12:00:00+02:00").unwrap();
        let minus_five = parse("2024-03-01T05:00:00-05:00").unwrap();
        assert_eq!(utc, plus_two);
        assert_eq!(utc, minus_five);
    }

    #[test]
    fn format_then_parse_keeps_sub_second_precision() {
        let now = Utc::now();
        assert_eq!(parse(&format(&now)), Some(now));
    }

    #[test]
    fn lenient_accepts_epoch_millis() {
        let h: Holder = serde_json::from_str(r#"{"at": 1709287200000}"#).unwrap();
        assert_eq!(h.at, parse("2024-03-01T10:00:00Z"));
    }

    #[test]
    fn lenient_turns_garbage_into_none() {
        let h: Holder = serde_json::from_str(r#"{"at": "yesterday-ish"}"#).unwrap();
        assert!(h.at.is_none());
        let h: Holder = serde_json::from_str(r#"{"at": null}"#).unwrap();
        assert!(h.at.is_none());
        let h: Holder = serde_json::from_str(r#"{}"#).unwrap();
        assert!(h.at.is_none());
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logs_while(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn unreadable_timestamp_is_logged() {
        let logs = logs_while(|| {
            let h: Holder = serde_json::from_str(r#"{"at": "yesterday-ish"}"#).unwrap();
            assert!(h.at.is_none());
        });
        assert!(logs.contains("unreadable timestamp"));
        assert!(logs.contains("yesterday-ish"));

        let quiet = logs_while(|| {
            let _: Holder = serde_json::from_str(r#"{"at": null}"#).unwrap();
            let _: Holder = serde_json::from_str(r#"{"at": "2024-03-01T10:00:00Z"}"#).unwrap();
        });
        assert!(quiet.is_empty());
    }

    #[test]
    fn lenient_omits_absent_values() {
        let json = serde_json::to_string(&Holder { at: None }).unwrap();
        assert_eq!(json, "{}");
    }
}
