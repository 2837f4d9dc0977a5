//! Core data types for VRP tracking.
//!
//! Market inputs (`PriceSeries`, `OptionChainSnapshot`) live only for the
//! duration of one run. `VrpRecord` is the durable projection that the
//! snapshot store persists and the viewer reads back.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One raw daily close as delivered upstream.
///
/// `close` is `None` when the provider sent something that does not coerce
/// to a positive number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyClose {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

impl DailyClose {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            close: Some(close),
        }
    }

    pub fn missing(date: NaiveDate) -> Self {
        Self { date, close: None }
    }
}

/// Closing prices of the underlying index, ascending by date.
///
/// Dates are unique. Missing closes stay in place so that returns across a
/// gap are treated as missing rather than silently bridged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    points: Vec<DailyClose>,
}

impl PriceSeries {
    /// Build a series from closes in arbitrary order.
    ///
    /// Sorts by date and keeps the last occurrence of a duplicated date.
    /// Non-finite and non-positive closes become missing.
    pub fn from_closes(mut closes: Vec<DailyClose>) -> Self {
        for c in &mut closes {
            if !c.close.is_some_and(|v| v.is_finite() && v > 0.0) {
                c.close = None;
            }
        }

        // stable sort keeps upstream order among equal dates
        closes.sort_by_key(|c| c.date);

        let mut points: Vec<DailyClose> = Vec::with_capacity(closes.len());
        for c in closes {
            match points.last_mut() {
                Some(last) if last.date == c.date => *last = c,
                _ => points.push(c),
            }
        }

        Self { points }
    }

    pub fn points(&self) -> &[DailyClose] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of closes that carry a value.
    pub fn valid_closes(&self) -> usize {
        self.points.iter().filter(|p| p.close.is_some()).count()
    }
}

/// A single strike row of an option chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeRow {
    /// Strike price
    pub strike: Decimal,

    /// Call implied volatility in percent, if quoted
    pub call_iv: Option<f64>,

    /// Put implied volatility in percent, if quoted
    pub put_iv: Option<f64>,
}

impl StrikeRow {
    pub fn new(strike: Decimal, call_iv: Option<f64>, put_iv: Option<f64>) -> Self {
        Self {
            strike,
            call_iv,
            put_iv,
        }
    }
}

/// Option chain for one (symbol, expiry) at capture time.
///
/// Rows are kept in the order the provider returned them; ATM selection
/// depends on that order for ties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChainSnapshot {
    /// Option symbol (e.g., "NIFTY")
    pub symbol: String,

    /// Expiration date of the chain
    pub expiry: NaiveDate,

    /// Last traded price of the underlying
    pub ltp: Decimal,

    /// Strike grid
    pub rows: Vec<StrikeRow>,
}

impl OptionChainSnapshot {
    pub fn new(symbol: &str, expiry: NaiveDate, ltp: Decimal, rows: Vec<StrikeRow>) -> Self {
        Self {
            symbol: symbol.to_string(),
            expiry,
            ltp,
            rows,
        }
    }
}

/// One persisted VRP row: (symbol, run date, expiry) plus derived metrics.
///
/// Every metric is optional. A failed expiry still produces a record with
/// all metrics absent so the history shows the attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VrpRecord {
    /// Surrogate key, assigned by the store
    pub id: Option<i64>,

    pub symbol: String,
    pub run_date: NaiveDate,
    pub expiry: NaiveDate,

    /// Underlying last traded price
    pub ltp: Option<f64>,

    /// Strike nearest to `ltp`
    pub atm_strike: Option<i64>,

    /// Mean of call and put IV at `atm_strike`
    pub atm_iv: Option<f64>,

    pub rv_5d: Option<f64>,
    pub rv_10d: Option<f64>,
    pub rv_20d: Option<f64>,

    pub vrp_5d: Option<f64>,
    pub vrp_10d: Option<f64>,
    pub vrp_20d: Option<f64>,

    pub inserted_at: NaiveDateTime,
}

impl VrpRecord {
    /// Record for an expiry whose chain could not be evaluated.
    pub fn empty(
        symbol: &str,
        run_date: NaiveDate,
        expiry: NaiveDate,
        inserted_at: NaiveDateTime,
    ) -> Self {
        Self {
            id: None,
            symbol: symbol.to_string(),
            run_date,
            expiry,
            ltp: None,
            atm_strike: None,
            atm_iv: None,
            rv_5d: None,
            rv_10d: None,
            rv_20d: None,
            vrp_5d: None,
            vrp_10d: None,
            vrp_20d: None,
            inserted_at,
        }
    }

    /// Whether every metric field is absent.
    pub fn is_empty(&self) -> bool {
        self.ltp.is_none()
            && self.atm_strike.is_none()
            && self.atm_iv.is_none()
            && self.rv_5d.is_none()
            && self.rv_10d.is_none()
            && self.rv_20d.is_none()
            && self.vrp_5d.is_none()
            && self.vrp_10d.is_none()
            && self.vrp_20d.is_none()
    }
}
