//! VRP metrics module.
//!
//! Provides:
//! - Realized volatility over 5/10/20 trailing returns
//! - ATM strike selection and ATM implied volatility
//! - The per-run engine producing one `VrpRecord` per expiry

pub mod atm;
pub mod engine;
pub mod realized_vol;

pub use atm::{atm_quote, nearest_strike, AtmError, AtmQuote};
pub use engine::{
    build_record, round2, EngineError, ExpiryOutcome, ExpirySelection, MetricsEngine, RunRequest,
    DEFAULT_EXPIRY_COUNT, DEFAULT_LOOKBACK_DAYS,
};
pub use realized_vol::{log_returns, trailing_volatility, RealizedVolatility, RV_WINDOWS};
