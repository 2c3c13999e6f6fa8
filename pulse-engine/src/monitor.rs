//! Per-metric monitor: one [`SnapshotStore`] plus the reports derived from it.

use crate::{
    change::{self, Materiality},
    config::EngineConfig,
    notify::{Notification, channel::Channel, format},
    ranking::{self, RankingResult},
    snapshot::SnapshotStore,
    types::{MetricKind, Window},
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Windows reported on by [`MetricMonitor::price`].
const PRICE_WINDOWS: [Window; 3] = [Window::M5, Window::M15, Window::H1];

/// Report produced by a [`MetricMonitor`] on every report cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportKind {
    /// One ranking table per window.
    PerWindow { windows: Vec<Window>, size: usize },
    /// One table ordered by the shortest window, with the others as extra columns.
    Combined { windows: Vec<Window>, size: usize },
    /// Instruments ranked by current value.
    Levels { size: usize },
}

#[derive(Debug, Clone)]
pub struct MetricMonitor {
    channel: Channel,
    store: SnapshotStore,
    reports: Vec<ReportKind>,
    materiality: Materiality,
}

impl MetricMonitor {
    pub fn new(channel: Channel, store: SnapshotStore) -> Self {
        Self {
            channel,
            store,
            reports: Vec::new(),
            materiality: Materiality::default(),
        }
    }

    pub fn with_report(mut self, report: ReportKind) -> Self {
        self.reports.push(report);
        self
    }

    pub fn with_materiality(mut self, materiality: Materiality) -> Self {
        self.materiality = materiality;
        self
    }

    /// Open interest: combined report across every configured window.
    pub fn open_interest(config: &EngineConfig, epoch: DateTime<Utc>) -> Self {
        let store = SnapshotStore::from_config(MetricKind::OpenInterest, config, epoch);
        let windows = store.windows().collect();
        Self::new(Channel::Position, store)
            .with_materiality(config.materiality)
            .with_report(ReportKind::Combined {
                windows,
                size: config.combined_ranking_size,
            })
    }

    /// Price: one table each for 5m, 15m and 1h, restricted to the configured windows.
    pub fn price(config: &EngineConfig, epoch: DateTime<Utc>) -> Self {
        let store = SnapshotStore::from_config(MetricKind::Price, config, epoch);
        let (windows, missing): (Vec<Window>, Vec<Window>) = PRICE_WINDOWS
            .into_iter()
            .partition(|window| store.windows().any(|configured| configured == *window));

        if !missing.is_empty() {
            warn!(
                metric = %MetricKind::Price,
                ?missing,
                "price report windows not configured, skipping them"
            );
        }

        let monitor = Self::new(Channel::PriceAlert, store).with_materiality(config.materiality);
        if windows.is_empty() {
            return monitor;
        }
        monitor.with_report(ReportKind::PerWindow {
            windows,
            size: config.ranking_size,
        })
    }

    /// Funding rate: current level ranking.
    pub fn funding_rate(config: &EngineConfig, epoch: DateTime<Utc>) -> Self {
        let store = SnapshotStore::from_config(MetricKind::FundingRate, config, epoch);
        Self::new(Channel::FundingRate, store)
            .with_materiality(config.materiality)
            .with_report(ReportKind::Levels {
                size: config.ranking_size,
            })
    }

    /// The default set of monitors, one per [`MetricKind`].
    pub fn defaults(config: &EngineConfig, epoch: DateTime<Utc>) -> Vec<Self> {
        vec![
            Self::open_interest(config, epoch),
            Self::price(config, epoch),
            Self::funding_rate(config, epoch),
        ]
    }

    pub fn metric(&self) -> MetricKind {
        self.store.metric()
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn reports(&self) -> &[ReportKind] {
        &self.reports
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SnapshotStore {
        &mut self.store
    }

    /// Roll every due window, returning the windows that rolled.
    pub fn roll(&mut self, now: DateTime<Utc>) -> Vec<Window> {
        self.store.roll_due(now)
    }

    /// Build the notifications for every configured report. Empty rankings produce none.
    pub fn report(&self) -> Vec<Notification> {
        self.reports
            .iter()
            .flat_map(|report| match report {
                ReportKind::PerWindow { windows, size } => windows
                    .iter()
                    .filter_map(|window| self.window_report(*window, *size))
                    .collect::<Vec<_>>(),
                ReportKind::Combined { windows, size } => {
                    self.combined_report(windows, *size).into_iter().collect()
                }
                ReportKind::Levels { size } => self.levels_report(*size).into_iter().collect(),
            })
            .collect()
    }

    fn window_report(&self, window: Window, size: usize) -> Option<Notification> {
        let metric = self.metric();
        if !self.store.is_warm(window) {
            info!(%metric, %window, "window warming up, no report");
            return None;
        }

        let set = change::compute_detailed(&self.store, window, &self.materiality);
        debug!(
            %metric,
            %window,
            records = set.records.len(),
            absent = set.absent,
            guarded = set.guarded,
            immaterial = set.immaterial,
            "computed window changes"
        );

        let result = RankingResult::new(metric, window, set.records, size);
        if result.is_empty() {
            info!(%metric, %window, "no material changes, no report");
            return None;
        }

        let notification = Notification::new(
            self.channel,
            format!("{} {} ranking", metric.label(), window),
            format::format_ranking(&result, self.store.current()),
        )
        .with_field("window", window.as_str())
        .with_field("increase", result.positive.len().to_string())
        .with_field("decrease", result.negative.len().to_string());

        Some(notification)
    }

    fn combined_report(&self, windows: &[Window], size: usize) -> Option<Notification> {
        let metric = self.metric();
        let primary = windows.iter().copied().min()?;
        if !self.store.is_warm(primary) {
            info!(%metric, window = %primary, "primary window warming up, no combined report");
            return None;
        }

        let records = change::compute(&self.store, primary, &self.materiality);
        let primary_ranking = RankingResult::new(metric, primary, records, size);
        if primary_ranking.is_empty() {
            info!(%metric, window = %primary, "no material changes, no combined report");
            return None;
        }

        let auxiliary: Vec<(Window, Vec<_>)> = windows
            .iter()
            .copied()
            .filter(|window| *window != primary)
            .map(|window| {
                let records = change::compute(&self.store, window, &Materiality::none());
                (window, records)
            })
            .collect();

        let combined = ranking::combine(&primary_ranking, self.store.current(), &auxiliary);
        let notification = Notification::new(
            self.channel,
            format!("{} multi-window ranking", metric.label()),
            format::format_combined(&combined),
        )
        .with_field("primary_window", primary.as_str())
        .with_field(
            "windows",
            combined
                .windows
                .iter()
                .map(Window::as_str)
                .collect::<Vec<_>>()
                .join(","),
        );

        Some(notification)
    }

    fn levels_report(&self, size: usize) -> Option<Notification> {
        let metric = self.metric();
        let levels = ranking::rank_levels(metric, self.store.current(), size);
        if levels.is_empty() {
            info!(%metric, "no samples, no level report");
            return None;
        }

        Some(
            Notification::new(
                self.channel,
                format!("{} levels", metric.label()),
                format::format_levels(&levels),
            )
            .with_field("instruments", self.store.current().len().to_string()),
        )
    }
}
