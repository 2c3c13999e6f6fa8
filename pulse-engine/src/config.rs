//! Engine configuration surface.

use crate::{
    change::Materiality,
    types::{InstrumentId, Window},
};
use std::{collections::BTreeMap, time::Duration};

/// Configuration consumed by the [`Engine`](crate::engine::Engine) and its components.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Roll interval per lagged window.
    pub window_intervals: BTreeMap<Window, Duration>,
    /// Ranking size for single-window reports.
    pub ranking_size: usize,
    /// Ranking size for combined multi-window reports.
    pub combined_ranking_size: usize,
    /// Default materiality applied to primary rankings.
    pub materiality: Materiality,
    /// Dedup time bucket width.
    pub cooldown: Duration,
    /// Maximum number of fingerprints held by the dedup gate.
    pub dedup_capacity: usize,
    /// Upper bound on a single notification delivery.
    pub send_timeout: Duration,
    /// Period of the sampling timer.
    pub sample_interval: Duration,
    /// Period of the roll check timer.
    pub roll_interval: Duration,
    /// Period of the report timer.
    pub report_interval: Duration,
    /// Concurrent fetches per batch.
    pub batch_size: usize,
    /// Delay between batches.
    pub batch_delay: Duration,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
    /// How long a fetched instrument universe is reused.
    pub universe_refresh: Duration,
    /// Current samples older than this are pruned (delisted instruments).
    pub stale_after: Duration,
    /// Fixed instrument list, bypassing the universe listing when set.
    pub instruments: Option<Vec<InstrumentId>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_intervals: Window::ALL
                .into_iter()
                .map(|window| (window, window.default_interval()))
                .collect(),
            ranking_size: 15,
            combined_ranking_size: 8,
            materiality: Materiality::percent(1.0),
            cooldown: Duration::from_secs(5 * 60),
            dedup_capacity: 100,
            send_timeout: Duration::from_secs(10),
            sample_interval: Duration::from_secs(60),
            roll_interval: Duration::from_secs(5),
            report_interval: Duration::from_secs(5 * 60),
            batch_size: 10,
            batch_delay: Duration::from_millis(500),
            fetch_timeout: Duration::from_secs(10),
            universe_refresh: Duration::from_secs(60 * 60),
            stale_after: Duration::from_secs(15 * 60),
            instruments: None,
        }
    }
}

impl EngineConfig {
    /// Roll interval for a window, falling back to the window's natural lag.
    pub fn interval(&self, window: Window) -> Duration {
        self.window_intervals
            .get(&window)
            .copied()
            .unwrap_or_else(|| window.default_interval())
    }

    /// Set the roll interval of one window
    pub fn with_window_interval(mut self, window: Window, interval: Duration) -> Self {
        self.window_intervals.insert(window, interval);
        self
    }

    /// Set single-window ranking size
    pub fn with_ranking_size(mut self, size: usize) -> Self {
        self.ranking_size = size;
        self
    }

    /// Set combined report ranking size
    pub fn with_combined_ranking_size(mut self, size: usize) -> Self {
        self.combined_ranking_size = size;
        self
    }

    /// Set default materiality
    pub fn with_materiality(mut self, materiality: Materiality) -> Self {
        self.materiality = materiality;
        self
    }

    /// Set dedup cooldown bucket width
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set dedup cache capacity
    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    /// Set per-notification delivery timeout
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the sampling, roll check and report timer periods
    pub fn with_timers(mut self, sample: Duration, roll: Duration, report: Duration) -> Self {
        self.sample_interval = sample;
        self.roll_interval = roll;
        self.report_interval = report;
        self
    }

    /// Set fetch batching
    pub fn with_batching(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size;
        self.batch_delay = batch_delay;
        self
    }

    /// Set per-fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Restrict sampling to a fixed instrument list
    pub fn with_instruments<I, S>(mut self, instruments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<InstrumentId>,
    {
        self.instruments = Some(instruments.into_iter().map(Into::into).collect());
        self
    }
}
