//! At-the-money strike and implied volatility.
//!
//! The ATM strike is the strike nearest the underlying's last traded price.
//! On equal distance the row the provider listed first wins. ATM IV is the
//! plain mean of call and put IV at that strike; a missing side fails the
//! lookup instead of falling back to a one-sided value. A side quoted at zero
//! (no trades) counts as missing.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::data::{OptionChainSnapshot, StrikeRow};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AtmError {
    #[error("Option chain is empty")]
    EmptyChain,

    #[error("Missing {side} IV at strike {strike}")]
    MissingIv { side: &'static str, strike: Decimal },
}

/// ATM figures for one expiry, unrounded.
#[derive(Debug, Clone, PartialEq)]
pub struct AtmQuote {
    pub ltp: Decimal,
    pub strike: Decimal,
    pub call_iv: f64,
    pub put_iv: f64,
}

impl AtmQuote {
    /// Mean of call and put IV.
    pub fn atm_iv(&self) -> f64 {
        (self.call_iv + self.put_iv) / 2.0
    }
}

/// Row whose strike minimizes `|strike - ltp|`, first one on ties.
pub fn nearest_strike(rows: &[StrikeRow], ltp: Decimal) -> Option<&StrikeRow> {
    rows.iter().min_by_key(|row| (row.strike - ltp).abs())
}

fn usable_iv(iv: Option<f64>) -> Option<f64> {
    iv.filter(|v| v.is_finite() && *v > 0.0)
}

pub fn atm_quote(chain: &OptionChainSnapshot) -> Result<AtmQuote, AtmError> {
    let row = nearest_strike(&chain.rows, chain.ltp).ok_or(AtmError::EmptyChain)?;

    let call_iv = usable_iv(row.call_iv).ok_or(AtmError::MissingIv {
        side: "call",
        strike: row.strike,
    })?;
    let put_iv = usable_iv(row.put_iv).ok_or(AtmError::MissingIv {
        side: "put",
        strike: row.strike,
    })?;

    Ok(AtmQuote {
        ltp: chain.ltp,
        strike: row.strike,
        call_iv,
        put_iv,
    })
}
