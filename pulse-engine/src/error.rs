use crate::types::InstrumentId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to obtain a single [`MetricSample`](crate::types::MetricSample) from a
/// [`MetricSource`](crate::sampler::MetricSource).
///
/// Always scoped to one instrument (or to the universe listing): the cycle that produced it
/// skips the instrument and carries on.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum FetchError {
    #[error("fetch timed out for {instrument} after {timeout_ms}ms")]
    Timeout {
        instrument: InstrumentId,
        timeout_ms: u64,
    },

    #[error("rate limited by exchange (status {status})")]
    RateLimited { status: u16 },

    #[error("unexpected HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("no data available for {0}")]
    Unavailable(InstrumentId),
}

impl FetchError {
    /// Determine if the exchange asked us to back off.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    /// Determine if the error is a per-fetch timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}

/// Failure of a notification [`Sink`](crate::notify::dispatch::Sink) transport.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("sink rejected notification with HTTP status {status}")]
    Status { status: u16 },

    #[error("sink did not complete within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Invalid engine configuration, surfaced at start-up.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum ConfigError {
    #[error("unknown window: {0}")]
    UnknownWindow(String),

    #[error("unknown notification channel: {0}")]
    UnknownChannel(String),

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
