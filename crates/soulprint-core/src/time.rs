//! Clock helpers. All wall-clock reads in the workspace go through here so
//! tests can reason about one time base.

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current Unix time in seconds.
pub fn now_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current time as an ISO-8601 string (used in persisted metadata).
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}
