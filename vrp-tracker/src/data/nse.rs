//! NSE client for index history and index option chains.
//!
//! Endpoints:
//! - `{base_url}/api/option-chain-indices?symbol=..` returns every strike for
//!   every listed expiry plus the underlying value and the expiry calendar.
//! - `{history_url}` (POST) returns daily index OHLC wrapped in a JSON string
//!   under `"d"`.
//!
//! NSE rejects cookie-less API calls, so the first request primes the session
//! by visiting the home page. All calls block the caller and are bounded by
//! the configured timeout.
//!
//! The option-chain payload covers every expiry, so a client fetches it once
//! per symbol and serves the expiry calendar and each expiry's chain from it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::de::{DeserializeOwned, Error as DeError, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::provider::{MarketDataProvider, ProviderError};
use super::types::{DailyClose, OptionChainSnapshot, StrikeRow};

/// Expiry format used by the option chain API ("26-Dec-2024").
const EXPIRY_FORMAT: &str = "%d-%b-%Y";

/// Date formats seen in index history rows.
const HISTORY_DATE_FORMATS: &[&str] = &["%d %b %Y", "%d-%b-%Y", "%Y-%m-%d"];

/// Connection settings for the NSE endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NseConfig {
    pub base_url: String,
    pub history_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for NseConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.nseindia.com".to_string(),
            history_url: "https://www.niftyindices.com/Backpage.aspx/getHistoricaldatatabletoString"
                .to_string(),
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/124.0 Safari/537.36"
                .to_string(),
        }
    }
}

/// Option chain response: everything lives under `records`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainResponse {
    pub records: ChainRecords,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRecords {
    #[serde(default)]
    pub expiry_dates: Vec<String>,
    #[serde(default)]
    pub data: Vec<ChainRow>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub underlying_value: Option<f64>,
}

/// One strike of one expiry, call side under `CE`, put side under `PE`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRow {
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub strike_price: Option<f64>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(rename = "CE", default)]
    pub call: Option<LegQuote>,
    #[serde(rename = "PE", default)]
    pub put: Option<LegQuote>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegQuote {
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub implied_volatility: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub underlying_value: Option<f64>,
}

/// Index history response wrapper; `d` is itself a JSON array encoded as a string.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    pub d: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRow {
    #[serde(rename = "HistoricalDate")]
    pub date: String,
    #[serde(rename = "CLOSE", default, deserialize_with = "de_opt_f64")]
    pub close: Option<f64>,
}

/// Blocking NSE client.
pub struct NseClient {
    client: Client,
    config: NseConfig,
    primed: Cell<bool>,
    request_count: Cell<u64>,
    chain_cache: RefCell<Option<(String, ChainRecords)>>,
}

impl NseClient {
    pub fn new(config: NseConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            config,
            primed: Cell::new(false),
            request_count: Cell::new(0),
            chain_cache: RefCell::new(None),
        })
    }

    /// Get request count for monitoring.
    pub fn request_count(&self) -> u64 {
        self.request_count.get()
    }

    fn prime_session(&self) {
        if self.primed.get() {
            return;
        }
        // cookies only; a failure here surfaces on the real request
        if let Err(e) = self.client.get(&self.config.base_url).send() {
            debug!("session priming failed: {}", e);
        }
        self.primed.set(true);
    }

    fn record_request(&self) {
        self.request_count.set(self.request_count.get() + 1);
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        self.prime_session();

        let url = format!("{}/{}", self.config.base_url, endpoint);
        let response = self.client.get(&url).query(params).send()?;
        self.record_request();

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(ProviderError::ApiError(format!("{}: {}", status, text)));
        }

        response.json().map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {}", e))
        })
    }

    fn chain_records(&self, symbol: &str) -> Result<ChainRecords, ProviderError> {
        self.cached_chain(symbol, || {
            let response: ChainResponse =
                self.get_json("api/option-chain-indices", &[("symbol", symbol)])?;
            Ok(response.records)
        })
    }

    /// Serve `symbol`'s chain from the last successful fetch, or fetch it.
    fn cached_chain(
        &self,
        symbol: &str,
        fetch: impl FnOnce() -> Result<ChainRecords, ProviderError>,
    ) -> Result<ChainRecords, ProviderError> {
        if let Some((cached, records)) = self.chain_cache.borrow().as_ref() {
            if cached == symbol {
                debug!("option chain for {} served from cache", symbol);
                return Ok(records.clone());
            }
        }

        let records = fetch()?;
        *self.chain_cache.borrow_mut() = Some((symbol.to_string(), records.clone()));
        Ok(records)
    }
}

impl MarketDataProvider for NseClient {
    fn index_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyClose>, ProviderError> {
        let cinfo = format!(
            "{{'name':'{symbol}','startDate':'{}','endDate':'{}','indexName':'{symbol}'}}",
            start.format(EXPIRY_FORMAT),
            end.format(EXPIRY_FORMAT)
        );
        let body = serde_json::json!({ "cinfo": cinfo });

        let response = self
            .client
            .post(&self.config.history_url)
            .json(&body)
            .send()?;
        self.record_request();

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(ProviderError::ApiError(format!("{}: {}", status, text)));
        }

        let wrapper: HistoryResponse = response.json().map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse history: {}", e))
        })?;
        let closes = parse_history(&wrapper.d)?;
        if closes.is_empty() {
            return Err(ProviderError::no_data(
                symbol,
                format!("no history between {start} and {end}"),
            ));
        }
        Ok(closes)
    }

    fn expiry_dates(&self, symbol: &str) -> Result<Vec<NaiveDate>, ProviderError> {
        let records = self.chain_records(symbol)?;
        parse_expiry_dates(&records.expiry_dates)
    }

    fn option_chain(
        &self,
        symbol: &str,
        expiry: NaiveDate,
    ) -> Result<OptionChainSnapshot, ProviderError> {
        let records = self.chain_records(symbol)?;
        records_to_chain(symbol, expiry, records)
    }
}

/// Decode the inner history array, coercing closes and dropping undated rows.
pub fn parse_history(payload: &str) -> Result<Vec<DailyClose>, ProviderError> {
    let rows: Vec<HistoryRow> = serde_json::from_str(payload)
        .map_err(|e| ProviderError::InvalidResponse(format!("Bad history payload: {}", e)))?;

    let mut closes = Vec::with_capacity(rows.len());
    for row in rows {
        match parse_history_date(&row.date) {
            Some(date) => closes.push(DailyClose {
                date,
                close: row.close,
            }),
            None => debug!("skipping history row with date '{}'", row.date),
        }
    }
    Ok(closes)
}

fn parse_history_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    HISTORY_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Parse the expiry calendar, keeping provider order.
pub fn parse_expiry_dates(raw: &[String]) -> Result<Vec<NaiveDate>, ProviderError> {
    raw.iter()
        .map(|s| {
            NaiveDate::parse_from_str(s.trim(), EXPIRY_FORMAT).map_err(|e| {
                ProviderError::InvalidResponse(format!("Bad expiry date '{}': {}", s, e))
            })
        })
        .collect()
}

/// Project the full chain onto a single expiry.
///
/// Rows without a strike are skipped. The underlying price comes from the
/// top-level `underlyingValue`, falling back to the first leg that carries one.
pub fn records_to_chain(
    symbol: &str,
    expiry: NaiveDate,
    records: ChainRecords,
) -> Result<OptionChainSnapshot, ProviderError> {
    let wanted = expiry.format(EXPIRY_FORMAT).to_string();

    let mut leg_underlying = None;
    let mut rows = Vec::new();
    for row in records.data {
        let same_expiry = row
            .expiry_date
            .as_deref()
            .is_some_and(|e| e.trim().eq_ignore_ascii_case(&wanted));
        if !same_expiry {
            continue;
        }
        let Some(strike) = row.strike_price.and_then(|s| Decimal::try_from(s).ok()) else {
            continue;
        };

        if leg_underlying.is_none() {
            leg_underlying = row
                .call
                .as_ref()
                .and_then(|q| q.underlying_value)
                .or_else(|| row.put.as_ref().and_then(|q| q.underlying_value));
        }

        rows.push(StrikeRow::new(
            strike,
            row.call.and_then(|q| quoted_iv(q.implied_volatility)),
            row.put.and_then(|q| quoted_iv(q.implied_volatility)),
        ));
    }

    if rows.is_empty() {
        return Err(ProviderError::no_data(symbol, format!("no strikes for expiry {wanted}")));
    }

    let ltp = records
        .underlying_value
        .or(leg_underlying)
        .and_then(|v| Decimal::try_from(v).ok())
        .ok_or_else(|| ProviderError::InvalidResponse("missing underlying value".to_string()))?;

    Ok(OptionChainSnapshot::new(symbol, expiry, ltp, rows))
}

/// NSE reports an untraded side as IV 0.
fn quoted_iv(iv: Option<f64>) -> Option<f64> {
    iv.filter(|v| *v > 0.0)
}

/// Lenient numeric field: numbers, numeric strings (thousands separators
/// allowed), and anything else as `None`.
fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OptNumVisitor;

    impl<'de> Visitor<'de> for OptNumVisitor {
        type Value = Option<f64>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("number, numeric string or null")
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(Some(v).filter(|v| v.is_finite()))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(Some(v as f64))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(Some(v as f64))
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            let cleaned: String = v.trim().chars().filter(|c| *c != ',').collect();
            Ok(cleaned.parse::<f64>().ok().filter(|v| v.is_finite()))
        }

        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            self.visit_str(&v)
        }

        fn visit_bool<E>(self, _v: bool) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(None)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(OptNumVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const CHAIN_JSON: &str = r#"
    {
      "records": {
        "expiryDates": ["25-Jan-2024", "01-Feb-2024", "29-Feb-2024"],
        "underlyingValue": 17980.0,
        "timestamp": "19-Jan-2024 15:30:00",
        "data": [
          {
            "strikePrice": 17900,
            "expiryDate": "25-Jan-2024",
            "CE": {"impliedVolatility": 14.1, "underlyingValue": 17980.0},
            "PE": {"impliedVolatility": 15.2, "underlyingValue": 17980.0}
          },
          {
            "strikePrice": 18000,
            "expiryDate": "25-Jan-2024",
            "CE": {"impliedVolatility": "13.90", "underlyingValue": 17980.0},
            "PE": {"impliedVolatility": 15.10, "underlyingValue": 17980.0}
          },
          {
            "strikePrice": 18100,
            "expiryDate": "25-Jan-2024",
            "CE": {"impliedVolatility": 13.5},
            "PE": {"impliedVolatility": "-"}
          },
          {
            "strikePrice": 18000,
            "expiryDate": "01-Feb-2024",
            "CE": {"impliedVolatility": 12.0},
            "PE": {"impliedVolatility": 12.4}
          },
          {
            "expiryDate": "25-Jan-2024",
            "CE": {"impliedVolatility": 99.0}
          }
        ]
      }
    }"#;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_chain_projects_single_expiry() {
        let response: ChainResponse = serde_json::from_str(CHAIN_JSON).unwrap();
        let chain = records_to_chain("NIFTY", d("2024-01-25"), response.records).unwrap();

        assert_eq!(chain.ltp, dec!(17980));
        assert_eq!(chain.rows.len(), 3);
        assert_eq!(chain.rows[1].strike, dec!(18000));
        assert_eq!(chain.rows[1].call_iv, Some(13.9));
        assert_eq!(chain.rows[2].put_iv, None);
    }

    #[test]
    fn test_zero_iv_is_treated_as_missing() {
        let payload = r#"{
            "records": {
                "expiryDates": ["25-Jan-2024"],
                "underlyingValue": 17980.0,
                "data": [{
                    "strikePrice": 18000,
                    "expiryDate": "25-Jan-2024",
                    "CE": {"impliedVolatility": 0},
                    "PE": {"impliedVolatility": 15.0}
                }]
            }
        }"#;
        let response: ChainResponse = serde_json::from_str(payload).unwrap();
        let chain = records_to_chain("NIFTY", d("2024-01-25"), response.records).unwrap();

        assert_eq!(chain.rows[0].call_iv, None);
        assert_eq!(chain.rows[0].put_iv, Some(15.0));
        assert!(crate::metrics::atm_quote(&chain).is_err());
    }

    #[test]
    fn test_chain_unknown_expiry_is_no_data() {
        let response: ChainResponse = serde_json::from_str(CHAIN_JSON).unwrap();
        let result = records_to_chain("NIFTY", d("2024-03-28"), response.records);
        assert!(matches!(result, Err(ProviderError::NoData { .. })));
    }

    #[test]
    fn test_expiry_dates_keep_order() {
        let response: ChainResponse = serde_json::from_str(CHAIN_JSON).unwrap();
        let expiries = parse_expiry_dates(&response.records.expiry_dates).unwrap();
        assert_eq!(
            expiries,
            vec![d("2024-01-25"), d("2024-02-01"), d("2024-02-29")]
        );
    }

    #[test]
    fn test_chain_fetched_once_per_symbol() {
        let client = NseClient::new(NseConfig::default()).unwrap();
        let fetches = Cell::new(0);
        let fetch = || {
            fetches.set(fetches.get() + 1);
            let response: ChainResponse = serde_json::from_str(CHAIN_JSON).unwrap();
            Ok(response.records)
        };

        let first = client.cached_chain("NIFTY", fetch).unwrap();
        let again = client.cached_chain("NIFTY", fetch).unwrap();
        assert_eq!(fetches.get(), 1);
        assert_eq!(first.expiry_dates, again.expiry_dates);
        assert_eq!(again.data.len(), 5);

        client.cached_chain("BANKNIFTY", fetch).unwrap();
        assert_eq!(fetches.get(), 2);
    }

    #[test]
    fn test_failed_chain_fetch_is_not_cached() {
        let client = NseClient::new(NseConfig::default()).unwrap();
        let failed = client.cached_chain("NIFTY", || {
            Err(ProviderError::ApiError("503 Service Unavailable".to_string()))
        });
        assert!(failed.is_err());

        let records = client
            .cached_chain("NIFTY", || {
                let response: ChainResponse = serde_json::from_str(CHAIN_JSON).unwrap();
                Ok(response.records)
            })
            .unwrap();
        assert_eq!(records.expiry_dates.len(), 3);
    }

    #[test]
    fn test_history_coerces_closes() {
        let payload = r#"[
            {"HistoricalDate": "19 Jan 2024", "OPEN": "21615.20", "CLOSE": "21,622.40"},
            {"HistoricalDate": "18 Jan 2024", "CLOSE": 21462.25},
            {"HistoricalDate": "17 Jan 2024", "CLOSE": "-"},
            {"HistoricalDate": "not a date", "CLOSE": "21000"}
        ]"#;

        let closes = parse_history(payload).unwrap();
        assert_eq!(closes.len(), 3);
        assert_eq!(closes[0].date, d("2024-01-19"));
        assert_eq!(closes[0].close, Some(21622.4));
        assert_eq!(closes[1].close, Some(21462.25));
        assert_eq!(closes[2].close, None);
    }

    #[test]
    fn test_history_rejects_garbage() {
        assert!(matches!(
            parse_history("<html>blocked</html>"),
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}
