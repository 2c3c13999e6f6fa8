use pulse_engine::error::{DispatchError, FetchError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `pulse-data`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error)]
pub enum DataError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("rate limited by remote (status {status})")]
    RateLimited { status: u16 },

    #[error("unexpected HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("invalid url: {0}")]
    Url(String),
}

impl DataError {
    /// Classify a non-2xx response. Binance answers 429 when a weight limit is hit and 418
    /// once the IP has been banned for ignoring 429s.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            418 | 429 => DataError::RateLimited { status },
            _ => DataError::Status {
                status,
                message: body.chars().take(256).collect(),
            },
        }
    }

    /// Determine if the remote asked us to back off.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DataError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for DataError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => DataError::from_status(status.as_u16(), &error.to_string()),
            None if error.is_decode() => DataError::Parse(error.to_string()),
            None => DataError::Request(error.to_string()),
        }
    }
}

impl From<url::ParseError> for DataError {
    fn from(error: url::ParseError) -> Self {
        DataError::Url(error.to_string())
    }
}

impl From<serde_json::Error> for DataError {
    fn from(error: serde_json::Error) -> Self {
        DataError::Parse(error.to_string())
    }
}

impl From<DataError> for FetchError {
    fn from(error: DataError) -> Self {
        match error {
            DataError::RateLimited { status } => FetchError::RateLimited { status },
            DataError::Status { status, message } => FetchError::Status { status, message },
            DataError::Parse(message) => FetchError::Parse(message),
            DataError::Request(message) | DataError::Url(message) => FetchError::Request(message),
        }
    }
}

impl From<DataError> for DispatchError {
    fn from(error: DataError) -> Self {
        match error {
            DataError::RateLimited { status } | DataError::Status { status, .. } => {
                DispatchError::Status { status }
            }
            other => DispatchError::Transport(other.to_string()),
        }
    }
}
