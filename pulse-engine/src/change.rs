//! Change detection between "current" and a lagged window snapshot.
//!
//! All functions here are pure: same snapshots in, same records out.

use crate::{
    snapshot::{Snapshot, SnapshotStore},
    types::{ChangeRecord, Window},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Minimum change magnitude for a [`ChangeRecord`] to be eligible for ranking.
///
/// A change is material when `|percent_delta| > percent`, or when `absolute` is set and
/// `|absolute_delta| > absolute`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Materiality {
    pub percent: f64,
    pub absolute: Option<f64>,
}

impl Materiality {
    pub fn percent(percent: f64) -> Self {
        Self {
            percent,
            absolute: None,
        }
    }

    /// Accept every change (including zero).
    pub fn none() -> Self {
        Self {
            percent: f64::NEG_INFINITY,
            absolute: None,
        }
    }

    pub fn with_absolute(mut self, absolute: f64) -> Self {
        self.absolute = Some(absolute);
        self
    }

    pub fn is_material(&self, absolute_delta: f64, percent_delta: f64) -> bool {
        percent_delta.abs() > self.percent
            || self
                .absolute
                .is_some_and(|threshold| absolute_delta.abs() > threshold)
    }
}

impl Default for Materiality {
    fn default() -> Self {
        Self::percent(1.0)
    }
}

/// Records produced for one window together with the reasons instruments were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub records: Vec<ChangeRecord>,
    /// In "current" but missing from the lagged snapshot (window warming up).
    pub absent: usize,
    /// Previous value `<= 0` or non-finite.
    pub guarded: usize,
    /// Failed the materiality test.
    pub immaterial: usize,
}

/// Compute changes of `window` against "current" for a [`SnapshotStore`].
///
/// A window that has never rolled yields no records.
pub fn compute(
    store: &SnapshotStore,
    window: Window,
    materiality: &Materiality,
) -> Vec<ChangeRecord> {
    compute_detailed(store, window, materiality).records
}

/// Same as [`compute`], also reporting skip counters.
pub fn compute_detailed(
    store: &SnapshotStore,
    window: Window,
    materiality: &Materiality,
) -> ChangeSet {
    match store.snapshot(window) {
        Some(previous) => compute_between(store.current(), previous, window, materiality),
        None => ChangeSet::default(),
    }
}

/// Compute changes between two snapshots, iterating instruments present in `current`.
///
/// Records are ordered by instrument id.
pub fn compute_between(
    current: &Snapshot,
    previous: &Snapshot,
    window: Window,
    materiality: &Materiality,
) -> ChangeSet {
    let mut set = ChangeSet::default();

    for (instrument, sample) in current.iter().sorted_by(|(a, _), (b, _)| a.cmp(b)) {
        let Some(before) = previous.get(instrument.as_str()) else {
            set.absent += 1;
            continue;
        };

        let previous_value = before.value;
        let current_value = sample.value;
        if previous_value <= 0.0 || !previous_value.is_finite() || !current_value.is_finite() {
            set.guarded += 1;
            continue;
        }

        let absolute_delta = current_value - previous_value;
        let percent_delta = absolute_delta / previous_value * 100.0;

        if !materiality.is_material(absolute_delta, percent_delta) {
            set.immaterial += 1;
            continue;
        }

        set.records.push(ChangeRecord {
            instrument: instrument.clone(),
            window,
            current_value,
            previous_value,
            absolute_delta,
            percent_delta,
            timestamp: sample.timestamp,
        });
    }

    set
}
