//! Deserialisation helpers for exchange REST payloads.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;

/// Deserialize a `String` as the desired type (eg/ Binance's `"openInterest": "123.45"`).
pub fn de_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::de::Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let data: &str = Deserialize::deserialize(deserializer)?;
    data.parse::<T>().map_err(serde::de::Error::custom)
}

/// Deserialize a `u64` epoch milliseconds value as a [`DateTime<Utc>`].
pub fn de_u64_epoch_ms_as_datetime_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let epoch_ms = u64::deserialize(deserializer)?;
    i64::try_from(epoch_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| serde::de::Error::custom(format!("epoch ms out of range: {epoch_ms}")))
}
