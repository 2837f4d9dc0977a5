//! Realized volatility from daily closes.
//!
//! RV over a window of N returns is the sample standard deviation of the
//! trailing N log returns, annualized with sqrt(252) and expressed in percent.
//! Only the most recent window matters for a run.

use statrs::statistics::Statistics;

use crate::data::PriceSeries;

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Windows (in returns) reported per run.
pub const RV_WINDOWS: [usize; 3] = [5, 10, 20];

/// Close-to-close log returns, one per consecutive pair of closes.
///
/// A return touching a missing close is itself missing.
pub fn log_returns(series: &PriceSeries) -> Vec<Option<f64>> {
    series
        .points()
        .windows(2)
        .map(|pair| match (pair[0].close, pair[1].close) {
            (Some(prev), Some(curr)) => Some((curr / prev).ln()),
            _ => None,
        })
        .collect()
}

/// Annualized volatility (percent) of the last `window` returns.
///
/// `None` unless at least `window` returns exist and the trailing ones are
/// all present.
pub fn trailing_volatility(returns: &[Option<f64>], window: usize) -> Option<f64> {
    if window < 2 || returns.len() < window {
        return None;
    }

    let tail: Option<Vec<f64>> = returns[returns.len() - window..].iter().copied().collect();
    let std_dev = tail?.iter().std_dev();
    let rv = std_dev * TRADING_DAYS_PER_YEAR.sqrt() * 100.0;

    rv.is_finite().then_some(rv)
}

/// RV triple shared by every expiry of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RealizedVolatility {
    pub rv_5d: Option<f64>,
    pub rv_10d: Option<f64>,
    pub rv_20d: Option<f64>,
}

impl RealizedVolatility {
    pub fn from_series(series: &PriceSeries) -> Self {
        Self::from_returns(&log_returns(series))
    }

    pub fn from_returns(returns: &[Option<f64>]) -> Self {
        let [w5, w10, w20] = RV_WINDOWS;
        Self {
            rv_5d: trailing_volatility(returns, w5),
            rv_10d: trailing_volatility(returns, w10),
            rv_20d: trailing_volatility(returns, w20),
        }
    }

    /// Whether no window could be computed.
    pub fn is_empty(&self) -> bool {
        self.rv_5d.is_none() && self.rv_10d.is_none() && self.rv_20d.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DailyClose;
    use chrono::{Duration, NaiveDate};

    fn series(closes: &[Option<f64>]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceSeries::from_closes(
            closes
                .iter()
                .enumerate()
                .map(|(i, c)| DailyClose {
                    date: start + Duration::days(i as i64),
                    close: *c,
                })
                .collect(),
        )
    }

    fn closes(values: &[f64]) -> PriceSeries {
        series(&values.iter().map(|v| Some(*v)).collect::<Vec<_>>())
    }

    #[test]
    fn test_log_returns_example() {
        let returns = log_returns(&closes(&[100.0, 101.0, 99.0, 100.0, 102.0]));
        let expected = [0.00995, -0.02000, 0.01005, 0.01980];

        assert_eq!(returns.len(), 4);
        for (r, e) in returns.iter().zip(expected) {
            assert!((r.unwrap() - e).abs() < 1e-4);
        }
    }

    #[test]
    fn test_five_closes_leave_rv_5d_undefined() {
        let rv = RealizedVolatility::from_series(&closes(&[100.0, 101.0, 99.0, 100.0, 102.0]));
        assert_eq!(rv.rv_5d, None);
        assert!(rv.is_empty());
    }

    #[test]
    fn test_sample_std_dev_annualized() {
        // returns alternate +r, -r: sample variance is 1.2 r^2
        let rv = RealizedVolatility::from_series(&closes(&[100.0, 110.0, 100.0, 110.0, 100.0, 110.0]));
        let r = 1.1f64.ln();
        let expected = r * 1.2f64.sqrt() * 252f64.sqrt() * 100.0;

        assert!((rv.rv_5d.unwrap() - expected).abs() < 1e-9);
        assert_eq!(rv.rv_10d, None);
        assert_eq!(rv.rv_20d, None);
    }

    #[test]
    fn test_window_needs_n_plus_one_closes() {
        let mut values: Vec<f64> = (0..20).map(|i| 100.0 + (i % 3) as f64).collect();
        let rv = RealizedVolatility::from_series(&closes(&values));
        assert!(rv.rv_10d.is_some());
        assert_eq!(rv.rv_20d, None);

        values.push(101.5);
        let rv = RealizedVolatility::from_series(&closes(&values));
        assert!(rv.rv_20d.is_some());
    }

    #[test]
    fn test_missing_close_in_window_is_undefined() {
        let rv = RealizedVolatility::from_series(&series(&[
            Some(100.0),
            Some(101.0),
            Some(99.0),
            None,
            Some(100.0),
            Some(102.0),
            Some(103.0),
        ]));
        assert_eq!(rv.rv_5d, None);
    }

    #[test]
    fn test_flat_prices_give_zero_vol() {
        let rv = RealizedVolatility::from_series(&closes(&[100.0; 6]));
        assert_eq!(rv.rv_5d, Some(0.0));
    }
}
