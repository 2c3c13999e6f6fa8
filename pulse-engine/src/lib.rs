//! Pulse Engine - rolling-window change detection and alerting for exchange metrics.
//!
//! Samples time-varying metrics (open interest, price, funding rate) for many instruments,
//! keeps lagged snapshots at fixed offsets (5m, 15m, 1h, 4h, 1d), ranks instruments by their
//! change against each snapshot and pushes de-duplicated top-N tables to notification sinks.
//!
//! The crate includes:
//! - [`SnapshotStore`]: "current" plus one independently rolled snapshot per [`Window`]
//! - [`change`]: pure delta computation with divide-by-zero and materiality guards
//! - [`ranking`]: deterministic top-K ranking and multi-window combination
//! - [`AlertDedupGate`]: time-bucketed notification fingerprinting
//! - [`notify`]: table formatting, [`Channel`] routing and the [`Sink`] abstraction
//! - [`Engine`]: single-threaded scheduler tying sampling, rolling and reporting together
//!
//! Exchange access and notification transports are external collaborators behind the
//! [`MetricSource`] and [`Sink`] traits.

/// Configuration surface.
pub mod config;

/// Change detection between "current" and lagged snapshots.
pub mod change;

/// Notification de-duplication.
pub mod dedup;

/// Scheduler.
pub mod engine;

/// Error types.
pub mod error;

/// Per-metric monitors.
pub mod monitor;

/// Notification payloads, formatting and dispatch.
pub mod notify;

/// Ranking of change records.
pub mod ranking;

/// Batched metric sampling.
pub mod sampler;

/// Rolling per-window snapshots.
pub mod snapshot;

/// Core data types.
pub mod types;

// Re-export commonly used types for convenience
pub use change::{ChangeSet, Materiality};
pub use config::EngineConfig;
pub use dedup::AlertDedupGate;
pub use engine::{Clock, Engine};
pub use error::{ConfigError, DispatchError, FetchError};
pub use monitor::{MetricMonitor, ReportKind};
pub use notify::{
    Notification,
    channel::Channel,
    dispatch::{DispatchOutcome, Dispatcher, Sink},
};
pub use ranking::{CombinedRanking, LevelRanking, RankingResult};
pub use sampler::{MetricSampler, MetricSource, SampleReport};
pub use snapshot::{RollState, Snapshot, SnapshotStore};
pub use types::{ChangeRecord, InstrumentId, MetricKind, MetricSample, Window};
