//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Instant `age_secs` seconds before `reference`
///
/// Used to compute the cutoff for abandoning stale placeholders.
pub fn cutoff_before(reference: DateTime<Utc>, age_secs: u64) -> DateTime<Utc> {
    i64::try_from(age_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|age| reference.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Format a timestamp for storage
///
/// Fixed-width UTC with microseconds, so stored values compare correctly as
/// TEXT (`created_at < ?`).
pub fn to_db_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 timestamp as stored in the database
pub fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
