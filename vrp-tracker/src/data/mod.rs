//! Market inputs and the upstream provider seam.

pub mod nse;
pub mod provider;
pub mod types;

pub use nse::{NseClient, NseConfig};
pub use provider::{MarketDataProvider, ProviderError, StaticProvider};
pub use types::{DailyClose, OptionChainSnapshot, PriceSeries, StrikeRow, VrpRecord};
