//! One scheduled run: compute records, then persist them as a single batch.

use thiserror::Error;
use tracing::info;

use crate::data::{MarketDataProvider, VrpRecord};
use crate::metrics::{EngineError, MetricsEngine, RunRequest};
use crate::store::{RecordSink, StoreError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to persist run: {0}")]
    Store(#[from] StoreError),
}

/// Records produced by a run and how many rows reached the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub records: Vec<VrpRecord>,
    pub appended: usize,
}

impl RunSummary {
    pub fn failed_expiries(&self) -> usize {
        self.records.iter().filter(|r| r.is_empty()).count()
    }
}

/// Run the engine and append its output atomically.
///
/// Nothing is written when the engine fails or yields no records.
pub fn run_once<P: MarketDataProvider>(
    engine: &MetricsEngine<P>,
    request: &RunRequest,
    sink: &mut dyn RecordSink,
) -> Result<RunSummary, PipelineError> {
    let records = engine.compute_run(request)?;
    if records.is_empty() {
        info!("Nothing to append for {} on {}", request.symbol_option, request.run_date);
        return Ok(RunSummary {
            records,
            appended: 0,
        });
    }

    let appended = sink.append(&records)?;
    Ok(RunSummary { records, appended })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DailyClose, OptionChainSnapshot, StaticProvider, StrikeRow};
    use crate::metrics::ExpirySelection;
    use crate::store::{CachedStore, SnapshotStore};
    use crate::viewer::{build_dashboard, Selection, ViewState};
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn clock() -> NaiveDateTime {
        d("2024-01-19").and_hms_opt(15, 45, 0).unwrap()
    }

    fn provider() -> StaticProvider {
        let end = d("2024-01-19");
        let closes = (0..30)
            .map(|i| {
                let close = 21_500.0 * (1.0 + 0.004 * ((i % 4) as f64 - 1.5));
                DailyClose::new(end - Duration::days(29 - i), close)
            })
            .collect();

        let chain = |expiry: &str, iv_shift: f64| {
            OptionChainSnapshot::new(
                "NIFTY",
                d(expiry),
                dec!(21622.4),
                vec![
                    StrikeRow::new(dec!(21550), Some(20.0), Some(20.0)),
                    StrikeRow::new(dec!(21600), Some(14.0 + iv_shift), Some(15.0 + iv_shift)),
                    StrikeRow::new(dec!(21650), Some(20.0), Some(20.0)),
                ],
            )
        };

        StaticProvider::new()
            .with_closes(closes)
            .with_expiries(vec![d("2024-01-25"), d("2024-02-01"), d("2024-02-29")])
            .with_chain(chain("2024-01-25", 0.0))
            .with_chain(chain("2024-02-01", 1.0))
            .with_chain(chain("2024-02-29", 2.0))
    }

    fn request() -> RunRequest {
        RunRequest::new("NIFTY 50", "NIFTY", d("2024-01-19"))
    }

    fn memory_store() -> SnapshotStore {
        let store = SnapshotStore::open_memory().unwrap();
        store.ensure_schema().unwrap();
        store
    }

    #[test]
    fn test_run_appends_one_row_per_expiry() {
        let engine = MetricsEngine::new(provider(), clock);
        let mut store = memory_store();

        let summary = run_once(&engine, &request(), &mut store).unwrap();
        assert_eq!(summary.appended, 3);
        assert_eq!(summary.failed_expiries(), 0);
        assert_eq!(store.row_count().unwrap(), 3);

        let rows = store.load_all().unwrap();
        assert!(rows.iter().all(|r| r.atm_strike == Some(21600)));
        assert!(rows.iter().all(|r| r.inserted_at == clock()));
        assert_eq!(rows[1].atm_iv, Some(15.5));
    }

    #[test]
    fn test_rerun_appends_duplicates() {
        let engine = MetricsEngine::new(provider(), clock);
        let mut store = memory_store();

        run_once(&engine, &request(), &mut store).unwrap();
        let before = store.row_count().unwrap();
        let summary = run_once(&engine, &request(), &mut store).unwrap();
        assert_eq!(store.row_count().unwrap(), before + summary.appended);
        assert_eq!(store.row_count().unwrap(), 6);
    }

    #[test]
    fn test_failed_expiry_is_stored_as_null_row() {
        let engine = MetricsEngine::new(provider().fail_expiry(d("2024-02-01")), clock);
        let mut store = memory_store();

        let summary = run_once(&engine, &request(), &mut store).unwrap();
        assert_eq!(summary.appended, 3);
        assert_eq!(summary.failed_expiries(), 1);

        let rows = store.load_all().unwrap();
        let failed = rows.iter().find(|r| r.expiry == d("2024-02-01")).unwrap();
        assert!(failed.is_empty());
        assert_eq!(failed.symbol, "NIFTY");
        assert_eq!(failed.run_date, d("2024-01-19"));
    }

    #[test]
    fn test_history_failure_writes_nothing() {
        let engine = MetricsEngine::new(provider().without_history(), clock);
        let mut store = memory_store();

        let result = run_once(&engine, &request(), &mut store);
        assert!(matches!(
            result,
            Err(PipelineError::Engine(EngineError::PriceHistory { .. }))
        ));
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn test_empty_expiry_list_skips_append() {
        let engine = MetricsEngine::new(provider(), clock);
        let mut store = memory_store();
        let req = request().with_expiries(ExpirySelection::Next(0));

        let summary = run_once(&engine, &req, &mut store).unwrap();
        assert_eq!(summary.appended, 0);
        assert!(summary.records.is_empty());
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn test_store_failure_surfaces() {
        let engine = MetricsEngine::new(provider(), clock);
        // no schema
        let mut store = SnapshotStore::open_memory().unwrap();

        let result = run_once(&engine, &request(), &mut store);
        assert!(matches!(result, Err(PipelineError::Store(_))));
    }

    #[test]
    fn test_run_then_view() {
        let engine = MetricsEngine::new(provider(), clock);
        let mut cache = CachedStore::new(memory_store(), std::time::Duration::from_secs(300));
        assert!(cache.load_all().unwrap().is_empty());

        run_once(&engine, &request(), &mut cache).unwrap();
        let records = cache.load_all().unwrap();
        assert_eq!(records.len(), 3);

        let selection = Selection::new("NIFTY", d("2024-01-19"), 0.0);
        let ViewState::Ready(dashboard) = build_dashboard(&records, selection) else {
            panic!("expected views");
        };

        let expiries: Vec<_> = dashboard.snapshot.iter().map(|r| r.expiry).collect();
        assert_eq!(expiries, vec![d("2024-01-25"), d("2024-02-01"), d("2024-02-29")]);

        let trend = dashboard.trend.unwrap();
        assert_eq!(trend.expiry, d("2024-02-29"));
        assert_eq!(trend.records.len(), 1);
        assert_eq!(dashboard.aggregate.len(), 3);

        // high-VRP rows are ordered by vrp_10d, highest first
        let vrps: Vec<f64> = dashboard.high_vrp.iter().filter_map(|r| r.vrp_10d).collect();
        assert!(vrps.windows(2).all(|w| w[0] >= w[1]));
    }
}
