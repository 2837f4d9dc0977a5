pub mod config;
pub mod data;
pub mod metrics;
pub mod pipeline;
pub mod store;
pub mod viewer;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError};
pub use data::{MarketDataProvider, NseClient, OptionChainSnapshot, PriceSeries, VrpRecord};
pub use metrics::{EngineError, ExpirySelection, MetricsEngine, RealizedVolatility, RunRequest};
pub use pipeline::{run_once, PipelineError, RunSummary};
pub use store::{CachedStore, RecordSink, SnapshotStore, StoreError};
pub use viewer::{build_dashboard, Selection, ViewState};
