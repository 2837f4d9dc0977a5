//! Upstream market data seam.
//!
//! The metrics engine only talks to a `MarketDataProvider`. `NseClient` is the
//! live implementation; `StaticProvider` serves canned data for tests and
//! offline replays.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use thiserror::Error;

use super::types::{DailyClose, OptionChainSnapshot};

/// Provider errors.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("No data available for {symbol} ({detail})")]
    NoData { symbol: String, detail: String },
}

impl ProviderError {
    pub fn no_data(symbol: &str, detail: impl Into<String>) -> Self {
        Self::NoData {
            symbol: symbol.to_string(),
            detail: detail.into(),
        }
    }
}

/// The three upstream operations consumed by the metrics engine.
pub trait MarketDataProvider {
    /// Daily closes for an index between `start` and `end` inclusive, in any order.
    fn index_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyClose>, ProviderError>;

    /// Upcoming option expiries for a symbol, in provider order.
    fn expiry_dates(&self, symbol: &str) -> Result<Vec<NaiveDate>, ProviderError>;

    /// Strike/IV grid plus underlying price for one expiry.
    fn option_chain(
        &self,
        symbol: &str,
        expiry: NaiveDate,
    ) -> Result<OptionChainSnapshot, ProviderError>;
}

/// In-memory provider.
///
/// History is filtered to the requested range. Expiries registered through
/// `fail_expiry` return an error instead of a chain.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    closes: Vec<DailyClose>,
    expiries: Vec<NaiveDate>,
    chains: HashMap<NaiveDate, OptionChainSnapshot>,
    failing: HashSet<NaiveDate>,
    history_unavailable: bool,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_closes(mut self, closes: Vec<DailyClose>) -> Self {
        self.closes = closes;
        self
    }

    pub fn with_expiries(mut self, expiries: Vec<NaiveDate>) -> Self {
        self.expiries = expiries;
        self
    }

    pub fn with_chain(mut self, chain: OptionChainSnapshot) -> Self {
        self.chains.insert(chain.expiry, chain);
        self
    }

    pub fn fail_expiry(mut self, expiry: NaiveDate) -> Self {
        self.failing.insert(expiry);
        self
    }

    pub fn without_history(mut self) -> Self {
        self.history_unavailable = true;
        self
    }
}

impl MarketDataProvider for StaticProvider {
    fn index_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyClose>, ProviderError> {
        if self.history_unavailable {
            return Err(ProviderError::ApiError(format!(
                "history for {symbol} unavailable"
            )));
        }
        Ok(self
            .closes
            .iter()
            .filter(|c| c.date >= start && c.date <= end)
            .copied()
            .collect())
    }

    fn expiry_dates(&self, _symbol: &str) -> Result<Vec<NaiveDate>, ProviderError> {
        Ok(self.expiries.clone())
    }

    fn option_chain(
        &self,
        symbol: &str,
        expiry: NaiveDate,
    ) -> Result<OptionChainSnapshot, ProviderError> {
        if self.failing.contains(&expiry) {
            return Err(ProviderError::ApiError(format!(
                "connection reset while fetching {symbol} {expiry}"
            )));
        }
        self.chains
            .get(&expiry)
            .cloned()
            .ok_or_else(|| ProviderError::no_data(symbol, format!("no chain for {expiry}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_static_history_is_range_filtered() {
        let provider = StaticProvider::new().with_closes(vec![
            DailyClose::new(d("2024-01-01"), 100.0),
            DailyClose::new(d("2024-01-15"), 101.0),
            DailyClose::new(d("2024-02-01"), 102.0),
        ]);

        let closes = provider
            .index_history("NIFTY 50", d("2024-01-10"), d("2024-02-01"))
            .unwrap();
        assert_eq!(closes.len(), 2);
        assert_eq!(closes[0].date, d("2024-01-15"));
    }

    #[test]
    fn test_static_failures() {
        let provider = StaticProvider::new()
            .fail_expiry(d("2024-01-25"))
            .without_history();

        assert!(provider
            .index_history("NIFTY 50", d("2024-01-01"), d("2024-01-31"))
            .is_err());
        assert!(matches!(
            provider.option_chain("NIFTY", d("2024-01-25")),
            Err(ProviderError::ApiError(_))
        ));
        assert!(matches!(
            provider.option_chain("NIFTY", d("2024-02-29")),
            Err(ProviderError::NoData { .. })
        ));
    }
}
