//! VRP metrics engine.
//!
//! One run:
//! 1. Fetch index closes over the lookback window (fatal on failure)
//! 2. Compute the 5/10/20-return RV triple from the latest closes
//! 3. Resolve the expiries to evaluate
//! 4. For each expiry, fetch its chain and derive ATM strike, ATM IV and VRP
//! 5. Emit one `VrpRecord` per expiry, all-null when the expiry failed
//!
//! The engine never reads the wall clock itself: the run date comes with the
//! request and insertion timestamps come from the injected clock.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data::{MarketDataProvider, PriceSeries, ProviderError, VrpRecord};

use super::atm::{atm_quote, AtmQuote};
use super::realized_vol::RealizedVolatility;

/// Default calendar-day lookback for the price series.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Default number of upcoming expiries evaluated.
pub const DEFAULT_EXPIRY_COUNT: usize = 3;

/// Errors that abort a whole run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Price history for {symbol} unavailable: {source}")]
    PriceHistory {
        symbol: String,
        #[source]
        source: ProviderError,
    },

    #[error("No usable closes for {symbol} between {start} and {end}")]
    EmptyHistory {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Expiry calendar for {symbol} unavailable: {source}")]
    ExpiryCalendar {
        symbol: String,
        #[source]
        source: ProviderError,
    },

    #[error("Lookback must be positive, got {0} days")]
    InvalidLookback(i64),
}

/// Which expiries a run evaluates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpirySelection {
    /// First `n` entries of the provider's expiry calendar.
    Next(usize),
    /// Caller-supplied expiries, evaluated in the given order.
    Explicit(Vec<NaiveDate>),
}

impl Default for ExpirySelection {
    fn default() -> Self {
        Self::Next(DEFAULT_EXPIRY_COUNT)
    }
}

/// Inputs of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Index name used for price history (e.g., "NIFTY 50").
    pub symbol_index: String,

    /// Option symbol used for chains and stored records (e.g., "NIFTY").
    pub symbol_option: String,

    /// Date the run is attributed to; also the end of the lookback window.
    pub run_date: NaiveDate,

    /// Calendar days of history to fetch.
    pub lookback_days: i64,

    pub expiries: ExpirySelection,
}

impl RunRequest {
    pub fn new(symbol_index: &str, symbol_option: &str, run_date: NaiveDate) -> Self {
        Self {
            symbol_index: symbol_index.to_string(),
            symbol_option: symbol_option.to_string(),
            run_date,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            expiries: ExpirySelection::default(),
        }
    }

    pub fn with_lookback(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn with_expiries(mut self, expiries: ExpirySelection) -> Self {
        self.expiries = expiries;
        self
    }

    /// Inclusive history window `[run_date - lookback, run_date]`.
    pub fn history_window(&self) -> (NaiveDate, NaiveDate) {
        (
            self.run_date - Duration::days(self.lookback_days),
            self.run_date,
        )
    }
}

/// Per-expiry result: priced, or failed with the reason.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpiryOutcome {
    Priced(AtmQuote),
    Failed { reason: String },
}

impl ExpiryOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Round to 2 decimals, half away from zero on the exact binary value.
///
/// Non-finite inputs have no value.
pub fn round2(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64_retain(value)?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
}

fn vrp(atm_iv: f64, rv: Option<f64>) -> Option<f64> {
    rv.and_then(|rv| round2(atm_iv - rv))
}

/// Assemble the persisted record for one expiry.
pub fn build_record(
    symbol: &str,
    run_date: NaiveDate,
    expiry: NaiveDate,
    rv: &RealizedVolatility,
    outcome: &ExpiryOutcome,
    inserted_at: NaiveDateTime,
) -> VrpRecord {
    let quote = match outcome {
        ExpiryOutcome::Priced(quote) => quote,
        ExpiryOutcome::Failed { .. } => {
            return VrpRecord::empty(symbol, run_date, expiry, inserted_at)
        }
    };

    let atm_iv = quote.atm_iv();
    VrpRecord {
        id: None,
        symbol: symbol.to_string(),
        run_date,
        expiry,
        ltp: quote.ltp.to_f64().and_then(round2),
        atm_strike: quote.strike.trunc().to_i64(),
        atm_iv: round2(atm_iv),
        rv_5d: rv.rv_5d.and_then(round2),
        rv_10d: rv.rv_10d.and_then(round2),
        rv_20d: rv.rv_20d.and_then(round2),
        vrp_5d: vrp(atm_iv, rv.rv_5d),
        vrp_10d: vrp(atm_iv, rv.rv_10d),
        vrp_20d: vrp(atm_iv, rv.rv_20d),
        inserted_at,
    }
}

/// Computes VRP records for one run against a market data provider.
pub struct MetricsEngine<P> {
    provider: P,
    clock: Box<dyn Fn() -> NaiveDateTime>,
}

impl<P: MarketDataProvider> MetricsEngine<P> {
    /// Create an engine; `clock` stamps `inserted_at` on every record.
    pub fn new(provider: P, clock: impl Fn() -> NaiveDateTime + 'static) -> Self {
        Self {
            provider,
            clock: Box::new(clock),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Fetch and order the price series for the request's window.
    pub fn fetch_price_series(&self, request: &RunRequest) -> Result<PriceSeries, EngineError> {
        if request.lookback_days <= 0 {
            return Err(EngineError::InvalidLookback(request.lookback_days));
        }

        let (start, end) = request.history_window();
        let closes = self
            .provider
            .index_history(&request.symbol_index, start, end)
            .map_err(|source| EngineError::PriceHistory {
                symbol: request.symbol_index.clone(),
                source,
            })?;

        let series = PriceSeries::from_closes(closes);
        if series.valid_closes() == 0 {
            return Err(EngineError::EmptyHistory {
                symbol: request.symbol_index.clone(),
                start,
                end,
            });
        }
        Ok(series)
    }

    /// Expiries to evaluate, in evaluation order.
    pub fn resolve_expiries(&self, request: &RunRequest) -> Result<Vec<NaiveDate>, EngineError> {
        match &request.expiries {
            ExpirySelection::Explicit(expiries) => Ok(expiries.clone()),
            ExpirySelection::Next(0) => Ok(Vec::new()),
            ExpirySelection::Next(n) => {
                let calendar = self
                    .provider
                    .expiry_dates(&request.symbol_option)
                    .map_err(|source| EngineError::ExpiryCalendar {
                        symbol: request.symbol_option.clone(),
                        source,
                    })?;
                Ok(calendar.into_iter().take(*n).collect())
            }
        }
    }

    /// Fetch one chain and price its ATM strike. Never fails the run.
    pub fn evaluate_expiry(&self, symbol: &str, expiry: NaiveDate) -> ExpiryOutcome {
        let chain = match self.provider.option_chain(symbol, expiry) {
            Ok(chain) => chain,
            Err(e) => {
                return ExpiryOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        match atm_quote(&chain) {
            Ok(quote) => ExpiryOutcome::Priced(quote),
            Err(e) => ExpiryOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// Compute one record per requested expiry.
    ///
    /// Price history problems abort the run before any expiry is touched.
    /// Expiry problems are logged and turned into all-null records.
    pub fn compute_run(&self, request: &RunRequest) -> Result<Vec<VrpRecord>, EngineError> {
        info!(
            "Computing VRP for {} ({}) on {} with {}-day lookback",
            request.symbol_option, request.symbol_index, request.run_date, request.lookback_days
        );

        let series = self.fetch_price_series(request)?;
        let rv = RealizedVolatility::from_series(&series);
        debug!(
            "{} closes loaded, rv_5d={:?} rv_10d={:?} rv_20d={:?}",
            series.valid_closes(),
            rv.rv_5d,
            rv.rv_10d,
            rv.rv_20d
        );
        if rv.rv_20d.is_none() {
            warn!(
                "Only {} closes in lookback window; 20-day RV undefined",
                series.valid_closes()
            );
        }

        let expiries = self.resolve_expiries(request)?;
        if expiries.is_empty() {
            info!("No expiries to evaluate");
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(expiries.len());
        let mut failed = 0;
        for expiry in expiries {
            let outcome = self.evaluate_expiry(&request.symbol_option, expiry);
            if outcome.is_failed() {
                failed += 1;
            }
            if let ExpiryOutcome::Failed { reason } = &outcome {
                warn!("Error fetching data for expiry {}: {}", expiry, reason);
            }
            records.push(build_record(
                &request.symbol_option,
                request.run_date,
                expiry,
                &rv,
                &outcome,
                (self.clock)(),
            ));
        }

        info!(
            "Computed {} records ({} failed expiries)",
            records.len(),
            failed
        );
        Ok(records)
    }
}
