//! Pulse Data - external collaborators for `pulse-engine`.
//!
//! - [`BinanceFuturesUsd`](exchange::binance::BinanceFuturesUsd): REST
//!   [`MetricSource`](pulse_engine::sampler::MetricSource) for open interest, mark price and
//!   funding rate on Binance USDⓈ-M perpetuals.
//! - [`WebhookSink`](webhook::WebhookSink): JSON webhook
//!   [`Sink`](pulse_engine::notify::dispatch::Sink).

/// Deserialisation helpers.
pub mod de;

/// All errors generated in `pulse-data`.
pub mod error;

/// Exchange REST clients.
pub mod exchange;

/// Webhook notification transport.
pub mod webhook;

pub use error::DataError;
pub use exchange::binance::{BASE_URL_BINANCE_FUTURES_USD, BinanceFuturesUsd};
pub use webhook::{WebhookFormat, WebhookSink};
