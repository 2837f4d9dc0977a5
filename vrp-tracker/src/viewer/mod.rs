//! Read-only dashboard over stored VRP snapshots.
//!
//! Provides:
//! - Snapshot, high-VRP, trend and per-expiry aggregate views
//! - Filter helpers (symbols, run-date bounds, per-date counts)
//! - Text rendering of the views and of run summaries

pub mod render;
pub mod views;

pub use render::{render_dashboard, records_table};
pub use views::{
    aggregate_view, build_dashboard, default_selection, high_vrp_view, run_date_bounds,
    run_date_counts, snapshot_view, symbols, trend_view, Dashboard, ExpiryAggregate, Selection,
    TrendPoint, TrendView, ViewState, DEFAULT_VRP_THRESHOLD, VRP_THRESHOLD_RANGE,
};
