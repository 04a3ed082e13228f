use chrono::{DateTime, Utc};

/// 2015-01-01T00:00:00Z in milliseconds.
pub const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Smallest snowflake that could have been created at `at`.
pub fn snowflake_from_datetime(at: DateTime<Utc>) -> u64 {
    let ms = (at.timestamp_millis() - DISCORD_EPOCH_MS).max(0) as u64;
    ms << 22
}

pub fn datetime_from_snowflake(id: u64) -> Option<DateTime<Utc>> {
    let ms = (id >> 22) as i64 + DISCORD_EPOCH_MS;
    DateTime::<Utc>::from_timestamp_millis(ms)
}
