//! Read cache in front of `SnapshotStore::load_all`.
//!
//! A cached load is served until it is older than the configured TTL or an
//! append goes through this wrapper. Writers that bypass the wrapper are only
//! seen once the TTL expires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::data::VrpRecord;

use super::{RecordSink, SnapshotStore, StoreResult};

struct CacheEntry {
    loaded_at: Instant,
    records: Arc<Vec<VrpRecord>>,
}

pub struct CachedStore {
    store: SnapshotStore,
    ttl: Duration,
    entry: Option<CacheEntry>,
}

impl CachedStore {
    pub fn new(store: SnapshotStore, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entry: None,
        }
    }

    /// Whether a fresh entry is currently held.
    pub fn is_warm(&self) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|e| e.loaded_at.elapsed() < self.ttl)
    }

    pub fn invalidate(&mut self) {
        if self.entry.take().is_some() {
            debug!("vrp_data cache invalidated");
        }
    }

    pub fn load_all(&mut self) -> StoreResult<Arc<Vec<VrpRecord>>> {
        if let Some(entry) = &self.entry {
            if entry.loaded_at.elapsed() < self.ttl {
                debug!("vrp_data cache hit ({} rows)", entry.records.len());
                return Ok(Arc::clone(&entry.records));
            }
        }

        let records = Arc::new(self.store.load_all()?);
        self.entry = Some(CacheEntry {
            loaded_at: Instant::now(),
            records: Arc::clone(&records),
        });
        Ok(records)
    }

    /// Append through the store, then drop the cached load whatever the outcome.
    pub fn append(&mut self, records: &[VrpRecord]) -> StoreResult<usize> {
        let result = self.store.append(records);
        self.invalidate();
        result
    }
}

impl RecordSink for CachedStore {
    fn append(&mut self, records: &[VrpRecord]) -> StoreResult<usize> {
        CachedStore::append(self, records)
    }
}
