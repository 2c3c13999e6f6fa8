//! Fixed-width table rendering of rankings.
//!
//! Column order is always: rank, instrument, auxiliary metric, then one column per window.

use crate::{
    ranking::{CombinedRanking, CombinedRow, LevelRanking, RankingResult},
    snapshot::Snapshot,
    types::{ChangeRecord, MetricKind, MetricSample},
};
use itertools::Itertools;

/// Placeholder for a cell without data (eg/ window still warming up).
pub const EMPTY_CELL: &str = "-";

/// Format a USD amount with a B/M/K suffix, eg/ `$1.23B`, `$45.6M`, `$7.8K`.
pub fn format_usd_compact(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();
    if abs >= 1_000_000_000.0 {
        format!("{sign}${:.2}B", abs / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("{sign}${:.1}M", abs / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{sign}${:.1}K", abs / 1_000.0)
    } else {
        format!("{sign}${:.2}", abs)
    }
}

/// Signed percentage with two decimals, eg/ `+5.26%`.
pub fn format_percent(percent: f64) -> String {
    format!("{:+.2}%", percent)
}

/// Funding rate (a fraction) as a signed percentage with four decimals, eg/ `+0.0100%`.
pub fn format_funding_rate(rate: f64) -> String {
    format!("{:+.4}%", rate * 100.0)
}

/// Price with precision scaled to its magnitude.
pub fn format_price(price: f64) -> String {
    let abs = price.abs();
    if abs >= 1_000.0 {
        format!("{:.2}", price)
    } else if abs >= 1.0 {
        format!("{:.4}", price)
    } else {
        format!("{:.6}", price)
    }
}

/// Plain quantity with a B/M/K suffix.
pub fn format_quantity(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1_000_000_000.0 {
        format!("{:.2}B", value / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("{:.2}M", value / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else {
        format!("{:.2}", value)
    }
}

/// Auxiliary column cell for a metric.
///
/// Open interest shows its notional USD value, price shows the price itself, and funding
/// rate shows the mark price.
pub fn auxiliary_cell(metric: MetricKind, current_value: f64, auxiliary: Option<f64>) -> String {
    match metric {
        MetricKind::OpenInterest => auxiliary
            .map(format_usd_compact)
            .unwrap_or_else(|| format_quantity(current_value)),
        MetricKind::Price => format_price(current_value),
        MetricKind::FundingRate => auxiliary
            .map(format_price)
            .unwrap_or_else(|| EMPTY_CELL.to_string()),
    }
}

fn optional_percent(percent: Option<f64>) -> String {
    percent
        .map(format_percent)
        .unwrap_or_else(|| EMPTY_CELL.to_string())
}

/// Render rows into a fixed-width table.
///
/// The first two columns (rank, instrument) are left aligned, all others right aligned.
pub fn render_table<S: AsRef<str>>(headers: &[S], rows: &[Vec<String>]) -> String {
    let columns = headers.len();
    let widths: Vec<usize> = (0..columns)
        .map(|column| {
            rows.iter()
                .filter_map(|row| row.get(column))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(headers[column].as_ref().chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header = render_row(headers, &widths);
    let separator = widths.iter().map(|width| "-".repeat(*width)).join("  ");
    let body = rows.iter().map(|row| render_row(row, &widths));

    std::iter::once(header)
        .chain(std::iter::once(separator))
        .chain(body)
        .join("\n")
}

fn render_row<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(column, (cell, width))| {
            let (cell, width) = (cell.as_ref(), *width);
            if column < 2 {
                format!("{cell:<width$}")
            } else {
                format!("{cell:>width$}")
            }
        })
        .join("  ")
        .trim_end()
        .to_string()
}

fn sections(increase: Option<String>, decrease: Option<String>) -> String {
    [
        increase.map(|table| format!("Top increase\n{table}")),
        decrease.map(|table| format!("Top decrease\n{table}")),
    ]
    .into_iter()
    .flatten()
    .join("\n\n")
}

/// Render a single-window [`RankingResult`]. `current` supplies the auxiliary column.
pub fn format_ranking(result: &RankingResult, current: &Snapshot) -> String {
    let headers = [
        "#",
        "Symbol",
        result.metric.auxiliary_label(),
        result.window.as_str(),
    ];

    let side = |records: &[ChangeRecord]| -> Option<String> {
        if records.is_empty() {
            return None;
        }
        let rows: Vec<Vec<String>> = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let auxiliary = current
                    .get(record.instrument.as_str())
                    .and_then(|sample| sample.auxiliary);
                vec![
                    (index + 1).to_string(),
                    record.instrument.to_string(),
                    auxiliary_cell(result.metric, record.current_value, auxiliary),
                    format_percent(record.percent_delta),
                ]
            })
            .collect();
        Some(render_table(&headers, &rows))
    };

    sections(side(&result.positive), side(&result.negative))
}

/// Render a multi-window [`CombinedRanking`].
pub fn format_combined(ranking: &CombinedRanking) -> String {
    let headers: Vec<String> = ["#", "Symbol", ranking.metric.auxiliary_label()]
        .into_iter()
        .map(str::to_string)
        .chain(ranking.windows.iter().map(|window| window.to_string()))
        .collect();

    let side = |rows: &[CombinedRow]| -> Option<String> {
        if rows.is_empty() {
            return None;
        }
        let rows: Vec<Vec<String>> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                [
                    (index + 1).to_string(),
                    row.instrument.to_string(),
                    auxiliary_cell(ranking.metric, row.current_value, row.auxiliary),
                ]
                .into_iter()
                .chain(row.deltas.iter().copied().map(optional_percent))
                .collect()
            })
            .collect();
        Some(render_table(headers.as_slice(), &rows))
    };

    sections(side(&ranking.positive), side(&ranking.negative))
}

/// Render a [`LevelRanking`] (eg/ funding rates by current value).
pub fn format_levels(levels: &LevelRanking) -> String {
    let value_header = match levels.metric {
        MetricKind::FundingRate => "Rate",
        MetricKind::OpenInterest | MetricKind::Price => "Value",
    };
    let headers = ["#", "Symbol", levels.metric.auxiliary_label(), value_header];

    let side = |samples: &[MetricSample]| -> Option<String> {
        if samples.is_empty() {
            return None;
        }
        let rows: Vec<Vec<String>> = samples
            .iter()
            .enumerate()
            .map(|(index, sample)| {
                let value = match levels.metric {
                    MetricKind::FundingRate => format_funding_rate(sample.value),
                    MetricKind::OpenInterest => format_quantity(sample.value),
                    MetricKind::Price => format_price(sample.value),
                };
                vec![
                    (index + 1).to_string(),
                    sample.instrument.to_string(),
                    auxiliary_cell(levels.metric, sample.value, sample.auxiliary),
                    value,
                ]
            })
            .collect();
        Some(render_table(&headers, &rows))
    };

    let positive = side(&levels.positive).map(|table| format!("Highest\n{table}"));
    let negative = side(&levels.negative).map(|table| format!("Lowest\n{table}"));
    [positive, negative].into_iter().flatten().join("\n\n")
}
