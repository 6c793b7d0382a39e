use chrono::{DateTime, SecondsFormat, Utc};

/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current UTC time as ISO-8601 with millisecond precision and `Z` suffix
///
/// Example: `2025-03-14T09:26:53.589Z`
pub fn now_iso8601() -> String {
    to_iso8601(Utc::now())
}

/// Fixed ISO-8601 rendering used for every persisted timestamp
pub fn to_iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
