//! Plain-text tables for the viewer and the run summary.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::data::VrpRecord;

use super::views::{Dashboard, ExpiryAggregate, TrendView};

const NULL_CELL: &str = "-";

pub fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => NULL_CELL.to_string(),
    }
}

fn fmt_opt_int(value: Option<i64>) -> String {
    value.map_or_else(|| NULL_CELL.to_string(), |v| v.to_string())
}

/// Right-aligned table with a dashed rule under the header.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.len());
            }
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", table_line(headers.iter().copied(), &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("  "));
    for row in rows {
        let _ = writeln!(out, "{}", table_line(row.iter().map(String::as_str), &widths));
    }
    out
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(c, w)| format!("{c:>w$}", w = *w))
        .collect::<Vec<_>>()
        .join("  ")
}

const RECORD_HEADERS: [&str; 10] = [
    "expiry", "ltp", "atm_strike", "atm_iv", "rv_5d", "vrp_5d", "rv_10d", "vrp_10d", "rv_20d",
    "vrp_20d",
];

fn record_row(r: &VrpRecord) -> Vec<String> {
    vec![
        r.expiry.to_string(),
        fmt_opt(r.ltp),
        fmt_opt_int(r.atm_strike),
        fmt_opt(r.atm_iv),
        fmt_opt(r.rv_5d),
        fmt_opt(r.vrp_5d),
        fmt_opt(r.rv_10d),
        fmt_opt(r.vrp_10d),
        fmt_opt(r.rv_20d),
        fmt_opt(r.vrp_20d),
    ]
}

/// One row per record, in the given order.
pub fn records_table<'a>(records: impl IntoIterator<Item = &'a VrpRecord>) -> String {
    let rows: Vec<Vec<String>> = records.into_iter().map(record_row).collect();
    table(&RECORD_HEADERS, &rows)
}

pub fn trend_table(trend: &TrendView<'_>) -> String {
    let rows: Vec<Vec<String>> = trend
        .points()
        .iter()
        .map(|p| {
            vec![
                p.run_date.to_string(),
                fmt_opt(p.atm_iv),
                fmt_opt(p.rv_10d),
                fmt_opt(p.vrp_10d),
            ]
        })
        .collect();
    table(&["run_date", "atm_iv", "rv_10d", "vrp_10d"], &rows)
}

pub fn aggregate_table(aggregate: &[ExpiryAggregate]) -> String {
    let rows: Vec<Vec<String>> = aggregate
        .iter()
        .map(|a| {
            vec![
                a.expiry.to_string(),
                fmt_opt(a.mean_vrp_10d),
                fmt_opt(a.max_vrp_10d),
                fmt_opt(a.min_vrp_10d),
                a.count.to_string(),
            ]
        })
        .collect();
    table(&["expiry", "mean", "max", "min", "count"], &rows)
}

pub fn run_date_counts_table(counts: &BTreeMap<NaiveDate, usize>) -> String {
    let rows: Vec<Vec<String>> = counts
        .iter()
        .map(|(date, n)| vec![date.to_string(), n.to_string()])
        .collect();
    table(&["run_date", "records"], &rows)
}

/// All four sections for one selection.
pub fn render_dashboard(dashboard: &Dashboard<'_>) -> String {
    let sel = &dashboard.selection;
    let mut out = String::new();

    let _ = writeln!(out, "Snapshot: {} on {}", sel.symbol, sel.run_date);
    if dashboard.is_empty_selection() {
        let _ = writeln!(out, "No records for this selection.");
    } else {
        out.push_str(&records_table(dashboard.snapshot.iter().copied()));
    }

    let _ = writeln!(out, "\nHigh VRP (vrp_10d > {:.2})", sel.vrp_threshold);
    if dashboard.high_vrp.is_empty() {
        let _ = writeln!(out, "No expiries above threshold.");
    } else {
        out.push_str(&records_table(dashboard.high_vrp.iter().copied()));
    }

    match &dashboard.trend {
        Some(trend) => {
            let _ = writeln!(out, "\nTrend for expiry {}", trend.expiry);
            out.push_str(&trend_table(trend));
        }
        None => {
            let _ = writeln!(out, "\nTrend: no expiry selected.");
        }
    }

    let _ = writeln!(out, "\nVRP-10D by expiry ({})", sel.symbol);
    out.push_str(&aggregate_table(&dashboard.aggregate));
    out
}
