//! Core data types shared by every stage of the pipeline.

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{borrow::Borrow, str::FromStr, time::Duration};

/// Unique instrument key (exchange trading symbol, eg/ "BTCUSDT").
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Display,
)]
#[serde(transparent)]
pub struct InstrumentId(SmolStr);

impl InstrumentId {
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(SmolStr::new(symbol.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for InstrumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for InstrumentId {
    fn from(value: String) -> Self {
        Self(SmolStr::from(value))
    }
}

impl Borrow<str> for InstrumentId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// Time-varying metric sampled per instrument.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[display("open_interest")]
    OpenInterest,
    #[display("price")]
    Price,
    #[display("funding_rate")]
    FundingRate,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::OpenInterest,
        MetricKind::Price,
        MetricKind::FundingRate,
    ];

    /// Human readable label used in notification titles.
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::OpenInterest => "Open Interest",
            MetricKind::Price => "Price",
            MetricKind::FundingRate => "Funding Rate",
        }
    }

    /// Header of the auxiliary column rendered next to the instrument.
    pub fn auxiliary_label(&self) -> &'static str {
        match self {
            MetricKind::OpenInterest => "OI Value",
            MetricKind::Price => "Price",
            MetricKind::FundingRate => "Mark",
        }
    }
}

impl FromStr for MetricKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open_interest" | "oi" => Ok(MetricKind::OpenInterest),
            "price" => Ok(MetricKind::Price),
            "funding_rate" | "funding" => Ok(MetricKind::FundingRate),
            other => Err(ConfigError::UnknownMetric(other.to_string())),
        }
    }
}

/// Named lag offset at which a historical snapshot is retained.
///
/// Variants are declared shortest first, so the derived [`Ord`] orders windows by lag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Display,
)]
pub enum Window {
    #[serde(rename = "5m")]
    #[display("5m")]
    M5,
    #[serde(rename = "15m")]
    #[display("15m")]
    M15,
    #[serde(rename = "1h")]
    #[display("1h")]
    H1,
    #[serde(rename = "4h")]
    #[display("4h")]
    H4,
    #[serde(rename = "1d")]
    #[display("1d")]
    D1,
}

impl Window {
    pub const ALL: [Window; 5] = [Window::M5, Window::M15, Window::H1, Window::H4, Window::D1];

    pub fn as_str(&self) -> &'static str {
        match self {
            Window::M5 => "5m",
            Window::M15 => "15m",
            Window::H1 => "1h",
            Window::H4 => "4h",
            Window::D1 => "1d",
        }
    }

    /// Default roll interval, equal to the lag the window represents.
    pub fn default_interval(&self) -> Duration {
        match self {
            Window::M5 => Duration::from_secs(5 * 60),
            Window::M15 => Duration::from_secs(15 * 60),
            Window::H1 => Duration::from_secs(60 * 60),
            Window::H4 => Duration::from_secs(4 * 60 * 60),
            Window::D1 => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl FromStr for Window {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "5m" => Ok(Window::M5),
            "15m" => Ok(Window::M15),
            "1h" => Ok(Window::H1),
            "4h" => Ok(Window::H4),
            "1d" | "24h" => Ok(Window::D1),
            other => Err(ConfigError::UnknownWindow(other.to_string())),
        }
    }
}

/// One observation of a metric for one instrument.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MetricSample {
    pub instrument: InstrumentId,
    pub value: f64,
    /// Secondary value rendered in the auxiliary column (eg/ open interest notional).
    pub auxiliary: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(instrument: impl Into<InstrumentId>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.into(),
            value,
            auxiliary: None,
            timestamp,
        }
    }

    pub fn with_auxiliary(mut self, auxiliary: f64) -> Self {
        self.auxiliary = Some(auxiliary);
        self
    }
}

/// Delta of one instrument between "current" and a lagged window snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChangeRecord {
    pub instrument: InstrumentId,
    pub window: Window,
    pub current_value: f64,
    pub previous_value: f64,
    pub absolute_delta: f64,
    pub percent_delta: f64,
    /// Timestamp of the current sample.
    pub timestamp: DateTime<Utc>,
}
