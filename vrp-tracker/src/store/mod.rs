//! Persistence for VRP snapshots.
//!
//! Provides:
//! - `SnapshotStore`: append-only SQLite table of `VrpRecord`s
//! - `CachedStore`: bounded, invalidate-on-append cache in front of `load_all`

pub mod cache;
pub mod snapshot_store;

use thiserror::Error;

use crate::data::VrpRecord;

pub use cache::CachedStore;
pub use snapshot_store::{SnapshotStore, StoreMode};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt store: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Destination for the records produced by a run.
pub trait RecordSink {
    /// Persist the batch atomically, returning the number of rows written.
    fn append(&mut self, records: &[VrpRecord]) -> StoreResult<usize>;
}
