//! Parsing of user-supplied schedule times.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// The short form users are asked to type.
pub const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Parse a raw `send_at` value into a UTC instant.
///
/// Accepted forms, first match wins:
/// 1. `YYYY-MM-DD HH:MM`, interpreted at `offset`.
/// 2. RFC 3339 with an explicit timezone (`2030-05-01T09:30:00+02:00`).
///
/// Returns `None` when neither form matches.
pub fn parse_send_at(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT) {
        return offset
            .from_local_datetime(&naive)
            .single()
            .map(|t| t.with_timezone(&Utc));
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
