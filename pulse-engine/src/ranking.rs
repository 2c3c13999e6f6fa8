//! Ranking of change records by delta magnitude.
//!
//! Ordering is fully deterministic: the positive side is sorted by `percent_delta` descending,
//! the negative side ascending (most negative first), and ties on either side are broken by
//! instrument id ascending.

use crate::{
    snapshot::Snapshot,
    types::{ChangeRecord, InstrumentId, MetricKind, MetricSample, Window},
};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Top-K records per side for one metric and window.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RankingResult {
    pub metric: MetricKind,
    pub window: Window,
    /// Descending by `percent_delta`, at most K entries.
    pub positive: Vec<ChangeRecord>,
    /// Ascending by `percent_delta`, at most K entries.
    pub negative: Vec<ChangeRecord>,
}

impl RankingResult {
    pub fn new<I>(metric: MetricKind, window: Window, records: I, k: usize) -> Self
    where
        I: IntoIterator<Item = ChangeRecord>,
    {
        let (positive, negative) = rank(records, k);
        Self {
            metric,
            window,
            positive,
            negative,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}

fn by_percent_desc(a: &ChangeRecord, b: &ChangeRecord) -> Ordering {
    b.percent_delta
        .total_cmp(&a.percent_delta)
        .then_with(|| a.instrument.cmp(&b.instrument))
}

fn by_percent_asc(a: &ChangeRecord, b: &ChangeRecord) -> Ordering {
    a.percent_delta
        .total_cmp(&b.percent_delta)
        .then_with(|| a.instrument.cmp(&b.instrument))
}

/// Partition records by the sign of `absolute_delta`, sort each side and truncate to `k`.
///
/// Records with a zero delta belong to neither side.
pub fn rank<I>(records: I, k: usize) -> (Vec<ChangeRecord>, Vec<ChangeRecord>)
where
    I: IntoIterator<Item = ChangeRecord>,
{
    let (mut positive, mut negative): (Vec<_>, Vec<_>) = records
        .into_iter()
        .filter(|record| record.absolute_delta != 0.0)
        .partition(|record| record.absolute_delta > 0.0);

    positive.sort_by(by_percent_desc);
    negative.sort_by(by_percent_asc);
    positive.truncate(k);
    negative.truncate(k);

    (positive, negative)
}

/// One row of a [`CombinedRanking`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CombinedRow {
    pub instrument: InstrumentId,
    pub current_value: f64,
    /// Auxiliary metric of the current sample (eg/ open interest notional).
    pub auxiliary: Option<f64>,
    /// `percent_delta` per column window, aligned with [`CombinedRanking::windows`]. `None`
    /// when the instrument has no record for that window (still warming up).
    pub deltas: Vec<Option<f64>>,
}

/// Multi-window report: rows selected and ordered by the primary (shortest) window, with the
/// remaining windows shown as auxiliary columns.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CombinedRanking {
    pub metric: MetricKind,
    pub primary: Window,
    /// Column windows, shortest first. Always contains `primary`.
    pub windows: Vec<Window>,
    pub positive: Vec<CombinedRow>,
    pub negative: Vec<CombinedRow>,
}

impl CombinedRanking {
    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}

/// Merge a primary [`RankingResult`] with the unfiltered records of other windows.
///
/// `current` provides the auxiliary metric column.
pub fn combine(
    primary: &RankingResult,
    current: &Snapshot,
    auxiliary: &[(Window, Vec<ChangeRecord>)],
) -> CombinedRanking {
    let mut windows: Vec<Window> = auxiliary
        .iter()
        .map(|(window, _)| *window)
        .filter(|window| *window != primary.window)
        .chain(std::iter::once(primary.window))
        .collect();
    windows.sort();
    windows.dedup();

    let lookups: FnvHashMap<Window, FnvHashMap<&str, f64>> = auxiliary
        .iter()
        .map(|(window, records)| {
            let by_instrument = records
                .iter()
                .map(|record| (record.instrument.as_str(), record.percent_delta))
                .collect();
            (*window, by_instrument)
        })
        .collect();

    let to_row = |record: &ChangeRecord| CombinedRow {
        instrument: record.instrument.clone(),
        current_value: record.current_value,
        auxiliary: current
            .get(record.instrument.as_str())
            .and_then(|sample| sample.auxiliary),
        deltas: windows
            .iter()
            .map(|window| {
                if *window == primary.window {
                    Some(record.percent_delta)
                } else {
                    lookups
                        .get(window)
                        .and_then(|lookup| lookup.get(record.instrument.as_str()))
                        .copied()
                }
            })
            .collect(),
    };

    CombinedRanking {
        metric: primary.metric,
        primary: primary.window,
        positive: primary.positive.iter().map(to_row).collect(),
        negative: primary.negative.iter().map(to_row).collect(),
        windows,
    }
}

/// Instruments ranked by their current level rather than by a delta.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LevelRanking {
    pub metric: MetricKind,
    /// Highest positive values first.
    pub positive: Vec<MetricSample>,
    /// Most negative values first.
    pub negative: Vec<MetricSample>,
}

impl LevelRanking {
    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}

/// Rank the samples of a snapshot by value, capped at `k` per side.
pub fn rank_levels(metric: MetricKind, snapshot: &Snapshot, k: usize) -> LevelRanking {
    let (mut positive, mut negative): (Vec<_>, Vec<_>) = snapshot
        .iter()
        .map(|(_, sample)| sample)
        .filter(|sample| sample.value.is_finite() && sample.value != 0.0)
        .cloned()
        .partition(|sample| sample.value > 0.0);

    positive.sort_by(|a, b| {
        b.value
            .total_cmp(&a.value)
            .then_with(|| a.instrument.cmp(&b.instrument))
    });
    negative.sort_by(|a, b| {
        a.value
            .total_cmp(&b.value)
            .then_with(|| a.instrument.cmp(&b.instrument))
    });
    positive.truncate(k);
    negative.truncate(k);

    LevelRanking {
        metric,
        positive,
        negative,
    }
}
