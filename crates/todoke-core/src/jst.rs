//! Fixed reference timezone (UTC+9) and due-time parsing.
//!
//! Campaign datetimes arrive from the admin console as either full RFC3339
//! strings or tz-naive local strings. Naive strings are always interpreted
//! in JST so that day-boundary and due-time semantics stay deterministic —
//! the reference offset is fixed, there is no DST.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

const JST_SECS: i32 = 9 * 3600;

/// The fixed UTC+9 reference offset.
pub fn offset() -> FixedOffset {
    FixedOffset::east_opt(JST_SECS).expect("valid fixed offset")
}

/// Parse a stored due-time string into a UTC instant.
///
/// Accepts RFC3339 (with any offset), or a tz-naive `YYYY-MM-DDTHH:MM[:SS]`
/// string interpreted as JST. Returns `None` for anything unparseable —
/// callers treat that as "not evaluable", never as a crash.
pub fn parse_due_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // Tz-naive forms from <input type="datetime-local"> style editors.
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return offset()
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }

    None
}

/// Format an instant for human-facing message bodies (JST wall clock).
pub fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&offset())
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// Add N calendar days in the reference timezone. With a fixed offset this
/// is exactly N x 24h, but the conversion keeps day-boundary semantics
/// explicit.
pub fn add_days(at: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    let local = at.with_timezone(&offset());
    (local + chrono::Duration::days(days)).with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let t = parse_due_time("2025-06-01T09:00:00+09:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2025-06-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_utc_z_suffix() {
        let t = parse_due_time("2024-01-08T00:00:00Z").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_naive_interpreted_as_jst() {
        // 09:00 JST == 00:00 UTC
        let t = parse_due_time("2025-06-01T09:00").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_unparseable_is_none() {
        assert!(parse_due_time("").is_none());
        assert!(parse_due_time("soon").is_none());
        assert!(parse_due_time("2025/06/01").is_none());
    }

    #[test]
    fn test_add_days() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let due = add_days(start, 7);
        assert_eq!(due, Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap());
    }
}
