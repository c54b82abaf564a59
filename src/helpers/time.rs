use chrono::{DateTime, Utc};

pub fn now_u64() -> u64 {
    now_i64().max(0) as u64
}

pub fn now_i64() -> i64 {
    Utc::now().timestamp()
}

/// RFC 3339 rendering of a unix timestamp, used by listings.
pub fn unix_to_rfc3339(unix_ts: u64) -> Option<String> {
    DateTime::from_timestamp(unix_ts as i64, 0).map(|dt| dt.to_rfc3339())
}
