//! Rolling per-window snapshots of one metric.
//!
//! A [`SnapshotStore`] holds the "current" value of a metric for every instrument plus one
//! lagged [`Snapshot`] per [`Window`]. Each window runs its own roll timer: once the window's
//! interval has elapsed since its last roll, "current" is copied into the window's snapshot.
//! Windows always roll directly from "current", never from a shorter window.

use crate::{
    config::EngineConfig,
    types::{InstrumentId, MetricKind, MetricSample, Window},
};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use std::{collections::BTreeMap, time::Duration};
use tracing::debug;

/// Point-in-time mapping from instrument to its observed [`MetricSample`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    samples: FnvHashMap<InstrumentId, MetricSample>,
    taken_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn get(&self, instrument: &str) -> Option<&MetricSample> {
        self.samples.get(instrument)
    }

    pub fn contains(&self, instrument: &str) -> bool {
        self.samples.contains_key(instrument)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentId, &MetricSample)> {
        self.samples.iter()
    }

    /// Time the snapshot was rolled into place. `None` for "current" and for windows still
    /// warming up.
    pub fn taken_at(&self) -> Option<DateTime<Utc>> {
        self.taken_at
    }

    fn insert(&mut self, sample: MetricSample) {
        self.samples.insert(sample.instrument.clone(), sample);
    }
}

impl FromIterator<MetricSample> for Snapshot {
    fn from_iter<T: IntoIterator<Item = MetricSample>>(iter: T) -> Self {
        let mut snapshot = Snapshot::default();
        iter.into_iter().for_each(|sample| snapshot.insert(sample));
        snapshot
    }
}

/// Per-window roll timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollState {
    /// Interval has not elapsed since the last roll.
    Pending,
    /// Interval has elapsed; the next `maybe_roll` with a non-empty "current" rolls.
    Due,
}

#[derive(Debug, Clone)]
struct WindowSlot {
    interval_ms: i64,
    last_roll: DateTime<Utc>,
    snapshot: Snapshot,
}

impl WindowSlot {
    fn state(&self, now: DateTime<Utc>) -> RollState {
        if (now - self.last_roll).num_milliseconds() >= self.interval_ms {
            RollState::Due
        } else {
            RollState::Pending
        }
    }
}

/// "current" plus one lagged [`Snapshot`] per configured [`Window`] for a single metric.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    metric: MetricKind,
    current: Snapshot,
    windows: BTreeMap<Window, WindowSlot>,
}

impl SnapshotStore {
    /// Construct a store whose window timers all start at `epoch`, so each window first rolls
    /// one full interval after start-up.
    pub fn new<I>(metric: MetricKind, intervals: I, epoch: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (Window, Duration)>,
    {
        let windows = intervals
            .into_iter()
            .map(|(window, interval)| {
                let slot = WindowSlot {
                    interval_ms: i64::try_from(interval.as_millis()).unwrap_or(i64::MAX),
                    last_roll: epoch,
                    snapshot: Snapshot::default(),
                };
                (window, slot)
            })
            .collect();

        Self {
            metric,
            current: Snapshot::default(),
            windows,
        }
    }

    pub fn from_config(metric: MetricKind, config: &EngineConfig, epoch: DateTime<Utc>) -> Self {
        Self::new(
            metric,
            config
                .window_intervals
                .iter()
                .map(|(window, interval)| (*window, *interval)),
            epoch,
        )
    }

    pub fn metric(&self) -> MetricKind {
        self.metric
    }

    /// Configured windows, shortest first.
    pub fn windows(&self) -> impl Iterator<Item = Window> + '_ {
        self.windows.keys().copied()
    }

    /// Overwrite "current" for the sample's instrument. Other instruments are untouched.
    pub fn update(&mut self, sample: MetricSample) {
        self.current.insert(sample);
    }

    /// Apply many samples in order, last writer wins per instrument.
    pub fn update_batch<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = MetricSample>,
    {
        samples.into_iter().for_each(|sample| self.update(sample));
    }

    /// Roll `window` if its interval has elapsed since its last roll.
    ///
    /// Returns `true` if the window's snapshot was replaced. A roll with an empty "current"
    /// is skipped and the window stays [`RollState::Due`].
    pub fn maybe_roll(&mut self, window: Window, now: DateTime<Utc>) -> bool {
        let Some(slot) = self.windows.get_mut(&window) else {
            return false;
        };

        if slot.state(now) == RollState::Pending {
            return false;
        }

        if self.current.is_empty() {
            debug!(metric = %self.metric, %window, "roll due but current snapshot is empty");
            return false;
        }

        slot.snapshot = Snapshot {
            samples: self.current.samples.clone(),
            taken_at: Some(now),
        };
        slot.last_roll = now;

        debug!(
            metric = %self.metric,
            %window,
            instruments = slot.snapshot.len(),
            "rolled window snapshot"
        );
        true
    }

    /// Call [`Self::maybe_roll`] for every window, returning those that rolled.
    pub fn roll_due(&mut self, now: DateTime<Utc>) -> Vec<Window> {
        let windows: Vec<Window> = self.windows().collect();
        windows
            .into_iter()
            .filter(|window| self.maybe_roll(*window, now))
            .collect()
    }

    pub fn roll_state(&self, window: Window, now: DateTime<Utc>) -> Option<RollState> {
        self.windows.get(&window).map(|slot| slot.state(now))
    }

    pub fn last_roll(&self, window: Window) -> Option<DateTime<Utc>> {
        self.windows.get(&window).map(|slot| slot.last_roll)
    }

    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    pub fn snapshot(&self, window: Window) -> Option<&Snapshot> {
        self.windows.get(&window).map(|slot| &slot.snapshot)
    }

    /// Whether `window` has been rolled at least once.
    pub fn is_warm(&self, window: Window) -> bool {
        self.snapshot(window)
            .is_some_and(|snapshot| snapshot.taken_at.is_some())
    }

    /// Drop "current" entries whose sample is older than `max_age`. Lagged snapshots are
    /// never pruned. Returns the number of entries removed.
    pub fn prune_stale(&mut self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let before = self.current.len();
        self.current
            .samples
            .retain(|_, sample| (now - sample.timestamp).num_milliseconds() <= max_age_ms);
        before - self.current.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn minutes(n: i64) -> TimeDelta {
        TimeDelta::minutes(n)
    }

    fn sample(symbol: &str, value: f64, time: DateTime<Utc>) -> MetricSample {
        MetricSample::new(symbol, value, time)
    }

    fn store() -> SnapshotStore {
        SnapshotStore::from_config(MetricKind::OpenInterest, &EngineConfig::default(), t0())
    }

    #[test]
    fn test_update_overwrites_current_only_for_instrument() {
        let mut store = store();
        store.update(sample("BTCUSDT", 100.0, t0()));
        store.update(sample("ETHUSDT", 50.0, t0()));
        store.update(sample("BTCUSDT", 101.0, t0()));

        assert_eq!(store.current().len(), 2);
        assert_eq!(store.current().get("BTCUSDT").unwrap().value, 101.0);
        assert_eq!(store.current().get("ETHUSDT").unwrap().value, 50.0);
    }

    #[test]
    fn test_update_batch_last_writer_wins() {
        let mut store = store();
        store.update_batch([
            sample("BTCUSDT", 1.0, t0()),
            sample("BTCUSDT", 2.0, t0()),
            sample("BTCUSDT", 3.0, t0()),
        ]);
        assert_eq!(store.current().get("BTCUSDT").unwrap().value, 3.0);
    }

    #[test]
    fn test_maybe_roll_is_noop_before_interval() {
        let mut store = store();
        store.update(sample("BTCUSDT", 100.0, t0()));

        let now = t0() + minutes(14);
        assert_eq!(store.roll_state(Window::M15, now), Some(RollState::Pending));
        assert!(!store.maybe_roll(Window::M15, now));
        assert!(store.snapshot(Window::M15).unwrap().is_empty());
        assert_eq!(store.last_roll(Window::M15), Some(t0()));
        assert!(!store.is_warm(Window::M15));
    }

    #[test]
    fn test_maybe_roll_copies_current_once_due() {
        let mut store = store();
        store.update(sample("BTCUSDT", 100.0, t0()));

        let now = t0() + minutes(15);
        assert_eq!(store.roll_state(Window::M15, now), Some(RollState::Due));
        assert!(store.maybe_roll(Window::M15, now));

        let snapshot = store.snapshot(Window::M15).unwrap();
        assert_eq!(snapshot.get("BTCUSDT").unwrap().value, 100.0);
        assert_eq!(snapshot.taken_at(), Some(now));
        assert_eq!(store.last_roll(Window::M15), Some(now));
        assert_eq!(store.roll_state(Window::M15, now), Some(RollState::Pending));
    }

    #[test]
    fn test_maybe_roll_is_idempotent_within_interval() {
        let mut store = store();
        store.update(sample("BTCUSDT", 100.0, t0()));
        let first = t0() + minutes(5);
        assert!(store.maybe_roll(Window::M5, first));
        let after_first = store.snapshot(Window::M5).unwrap().clone();

        // Current moves on, but the window is not due again yet
        store.update(sample("BTCUSDT", 120.0, first));
        assert!(!store.maybe_roll(Window::M5, first + minutes(1)));
        assert!(!store.maybe_roll(Window::M5, first + minutes(4)));

        assert_eq!(store.snapshot(Window::M5).unwrap(), &after_first);
        assert_eq!(store.last_roll(Window::M5), Some(first));
    }

    #[test]
    fn test_windows_roll_independently() {
        let mut store = store();
        store.update(sample("BTCUSDT", 100.0, t0()));

        let rolled = store.roll_due(t0() + minutes(5));
        assert_eq!(rolled, vec![Window::M5]);

        let rolled = store.roll_due(t0() + minutes(15));
        assert_eq!(rolled, vec![Window::M5, Window::M15]);

        let rolled = store.roll_due(t0() + minutes(60));
        assert_eq!(rolled, vec![Window::M5, Window::M15, Window::H1]);
        assert!(!store.is_warm(Window::H4));
        assert!(!store.is_warm(Window::D1));
    }

    #[test]
    fn test_roll_with_empty_current_stays_due() {
        let mut store = store();
        let now = t0() + minutes(5);

        assert!(!store.maybe_roll(Window::M5, now));
        assert_eq!(store.roll_state(Window::M5, now), Some(RollState::Due));
        assert_eq!(store.last_roll(Window::M5), Some(t0()));

        store.update(sample("BTCUSDT", 100.0, now));
        assert!(store.maybe_roll(Window::M5, now + minutes(1)));
    }

    #[test]
    fn test_unknown_window_never_rolls() {
        let config = EngineConfig {
            window_intervals: [(Window::M5, Window::M5.default_interval())]
                .into_iter()
                .collect(),
            ..EngineConfig::default()
        };
        let mut store = SnapshotStore::from_config(MetricKind::Price, &config, t0());
        store.update(sample("BTCUSDT", 1.0, t0()));

        assert!(!store.maybe_roll(Window::D1, t0() + minutes(24 * 60)));
        assert!(store.snapshot(Window::D1).is_none());
        assert_eq!(store.roll_state(Window::D1, t0()), None);
    }

    #[test]
    fn test_failed_sample_leaves_other_entries_intact() {
        let mut store = store();
        store.update_batch([
            sample("BTCUSDT", 100.0, t0()),
            sample("ETHUSDT", 50.0, t0()),
            sample("SOLUSDT", 10.0, t0()),
        ]);
        assert!(store.maybe_roll(Window::M5, t0() + minutes(5)));

        // Next cycle: ETHUSDT fetch failed, only BTC and SOL refreshed
        let next = t0() + minutes(6);
        store.update_batch([sample("BTCUSDT", 110.0, next), sample("SOLUSDT", 11.0, next)]);

        assert_eq!(store.current().get("ETHUSDT").unwrap().value, 50.0);
        assert_eq!(store.current().get("BTCUSDT").unwrap().value, 110.0);
        let lagged = store.snapshot(Window::M5).unwrap();
        assert_eq!(lagged.len(), 3);
        assert_eq!(lagged.get("ETHUSDT").unwrap().value, 50.0);
    }

    #[test]
    fn test_prune_stale_only_touches_current() {
        let mut store = store();
        store.update(sample("BTCUSDT", 100.0, t0()));
        store.update(sample("DELISTEDUSDT", 5.0, t0()));
        assert!(store.maybe_roll(Window::M5, t0() + minutes(5)));

        let now = t0() + minutes(30);
        store.update(sample("BTCUSDT", 105.0, now));

        let removed = store.prune_stale(now, Duration::from_secs(15 * 60));
        assert_eq!(removed, 1);
        assert!(!store.current().contains("DELISTEDUSDT"));
        assert!(store.snapshot(Window::M5).unwrap().contains("DELISTEDUSDT"));
    }
}
