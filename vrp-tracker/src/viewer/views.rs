//! Derived views over loaded VRP records.
//!
//! Everything here is a pure function of the record set and the user's
//! selection. Nothing touches the store.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::VrpRecord;

/// Default minimum 10-day VRP for the high-VRP view.
pub const DEFAULT_VRP_THRESHOLD: f64 = 5.0;

/// Allowed threshold range (inclusive).
pub const VRP_THRESHOLD_RANGE: (f64, f64) = (0.0, 10.0);

/// User selection driving the views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub symbol: String,
    pub run_date: NaiveDate,
    pub vrp_threshold: f64,
}

impl Selection {
    /// Threshold is clamped into `VRP_THRESHOLD_RANGE`; NaN falls back to the default.
    pub fn new(symbol: &str, run_date: NaiveDate, vrp_threshold: f64) -> Self {
        let (lo, hi) = VRP_THRESHOLD_RANGE;
        let vrp_threshold = if vrp_threshold.is_nan() {
            DEFAULT_VRP_THRESHOLD
        } else {
            vrp_threshold.clamp(lo, hi)
        };
        Self {
            symbol: symbol.to_string(),
            run_date,
            vrp_threshold,
        }
    }
}

/// Distinct symbols in first-seen order.
pub fn symbols(records: &[VrpRecord]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for r in records {
        let symbol = r.symbol.as_str();
        if !symbol.is_empty() && !seen.contains(&symbol) {
            seen.push(symbol);
        }
    }
    seen
}

/// Earliest and latest run date present.
pub fn run_date_bounds(records: &[VrpRecord]) -> Option<(NaiveDate, NaiveDate)> {
    let min = records.iter().map(|r| r.run_date).min()?;
    let max = records.iter().map(|r| r.run_date).max()?;
    Some((min, max))
}

/// Number of records per run date, ascending by date.
pub fn run_date_counts(records: &[VrpRecord]) -> BTreeMap<NaiveDate, usize> {
    let mut counts = BTreeMap::new();
    for r in records {
        *counts.entry(r.run_date).or_insert(0) += 1;
    }
    counts
}

/// First symbol at the latest run date.
pub fn default_selection(records: &[VrpRecord], vrp_threshold: f64) -> Option<Selection> {
    let symbol = *symbols(records).first()?;
    let (_, latest) = run_date_bounds(records)?;
    Some(Selection::new(symbol, latest, vrp_threshold))
}

/// Records for (symbol, run_date), expiry ascending.
pub fn snapshot_view<'a>(
    records: &'a [VrpRecord],
    symbol: &str,
    run_date: NaiveDate,
) -> Vec<&'a VrpRecord> {
    let mut view: Vec<&VrpRecord> = records
        .iter()
        .filter(|r| r.symbol == symbol && r.run_date == run_date)
        .collect();
    view.sort_by_key(|r| r.expiry);
    view
}

/// Snapshot rows with `vrp_10d` strictly above the threshold, highest first.
pub fn high_vrp_view<'a>(snapshot: &[&'a VrpRecord], vrp_threshold: f64) -> Vec<&'a VrpRecord> {
    let mut view: Vec<&VrpRecord> = snapshot
        .iter()
        .copied()
        .filter(|r| r.vrp_10d.is_some_and(|v| v > vrp_threshold))
        .collect();
    view.sort_by(|a, b| {
        let (a, b) = (a.vrp_10d.unwrap_or(f64::MIN), b.vrp_10d.unwrap_or(f64::MIN));
        b.total_cmp(&a)
    });
    view
}

/// One point of the trend chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub run_date: NaiveDate,
    pub atm_iv: Option<f64>,
    pub rv_10d: Option<f64>,
    pub vrp_10d: Option<f64>,
}

/// History of a single expiry across run dates.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendView<'a> {
    pub expiry: NaiveDate,
    pub records: Vec<&'a VrpRecord>,
}

impl TrendView<'_> {
    /// Chart series: ATM IV, RV-10D and VRP-10D against run date.
    pub fn points(&self) -> Vec<TrendPoint> {
        self.records
            .iter()
            .map(|r| TrendPoint {
                run_date: r.run_date,
                atm_iv: r.atm_iv,
                rv_10d: r.rv_10d,
                vrp_10d: r.vrp_10d,
            })
            .collect()
    }
}

/// Time series for the latest expiry in `snapshot`, run date ascending.
///
/// `None` when the snapshot is empty.
pub fn trend_view<'a>(
    records: &'a [VrpRecord],
    symbol: &str,
    snapshot: &[&VrpRecord],
) -> Option<TrendView<'a>> {
    let expiry = snapshot.iter().map(|r| r.expiry).max()?;
    let mut series: Vec<&VrpRecord> = records
        .iter()
        .filter(|r| r.symbol == symbol && r.expiry == expiry)
        .collect();
    series.sort_by_key(|r| r.run_date);
    Some(TrendView {
        expiry,
        records: series,
    })
}

/// `vrp_10d` statistics for one expiry across all run dates.
///
/// Null values are ignored; `count` is the number of non-null values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiryAggregate {
    pub expiry: NaiveDate,
    pub mean_vrp_10d: Option<f64>,
    pub max_vrp_10d: Option<f64>,
    pub min_vrp_10d: Option<f64>,
    pub count: usize,
}

impl ExpiryAggregate {
    fn from_values(expiry: NaiveDate, values: &[f64]) -> Self {
        use statrs::statistics::Statistics;

        if values.is_empty() {
            return Self {
                expiry,
                mean_vrp_10d: None,
                max_vrp_10d: None,
                min_vrp_10d: None,
                count: 0,
            };
        }

        Self {
            expiry,
            mean_vrp_10d: Some(Statistics::mean(values.iter())),
            max_vrp_10d: Some(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            min_vrp_10d: Some(values.iter().copied().fold(f64::INFINITY, f64::min)),
            count: values.len(),
        }
    }
}

/// Per-expiry `vrp_10d` statistics for a symbol, highest mean first.
///
/// Groups without any value sort last; equal means keep expiry order.
pub fn aggregate_view(records: &[VrpRecord], symbol: &str) -> Vec<ExpiryAggregate> {
    let mut groups: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for r in records.iter().filter(|r| r.symbol == symbol) {
        let values = groups.entry(r.expiry).or_default();
        if let Some(v) = r.vrp_10d {
            values.push(v);
        }
    }

    let mut view: Vec<ExpiryAggregate> = groups
        .iter()
        .map(|(expiry, values)| ExpiryAggregate::from_values(*expiry, values))
        .collect();
    view.sort_by(|a, b| match (a.mean_vrp_10d, b.mean_vrp_10d) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    view
}

/// All four views for one selection.
#[derive(Debug, Clone)]
pub struct Dashboard<'a> {
    pub selection: Selection,
    pub snapshot: Vec<&'a VrpRecord>,
    pub high_vrp: Vec<&'a VrpRecord>,
    pub trend: Option<TrendView<'a>>,
    pub aggregate: Vec<ExpiryAggregate>,
}

impl Dashboard<'_> {
    /// Whether the selection matched no snapshot rows.
    pub fn is_empty_selection(&self) -> bool {
        self.snapshot.is_empty()
    }
}

/// Viewer outcome: nothing stored yet, or the computed views.
#[derive(Debug, Clone)]
pub enum ViewState<'a> {
    NoData,
    Ready(Dashboard<'a>),
}

pub fn build_dashboard(records: &[VrpRecord], selection: Selection) -> ViewState<'_> {
    if records.is_empty() {
        return ViewState::NoData;
    }

    let snapshot = snapshot_view(records, &selection.symbol, selection.run_date);
    let high_vrp = high_vrp_view(&snapshot, selection.vrp_threshold);
    let trend = trend_view(records, &selection.symbol, &snapshot);
    let aggregate = aggregate_view(records, &selection.symbol);

    ViewState::Ready(Dashboard {
        selection,
        snapshot,
        high_vrp,
        trend,
        aggregate,
    })
}
