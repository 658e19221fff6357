//! In-memory report store.

use crate::error::StoreError;
use crate::row::{CacheKey, ReportRow};
use crate::store::{InsertOutcome, ReportStore, sort_oldest_first};
use async_trait::async_trait;
use dfr_kernel::Fingerprint;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Process-local store with the same uniqueness contract as the JSONL store.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    rows: Mutex<BTreeMap<CacheKey, ReportRow>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<CacheKey, ReportRow>> {
        // A poisoned map is still a consistent map: every mutation is a
        // single insert.
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<ReportRow>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn insert_if_absent(&self, row: ReportRow) -> Result<InsertOutcome, StoreError> {
        let mut rows = self.lock();
        let key = row.key();
        if let Some(existing) = rows.get(&key) {
            return Ok(InsertOutcome::Existing(Box::new(existing.clone())));
        }
        rows.insert(key, row);
        Ok(InsertOutcome::Inserted)
    }

    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<ReportRow>, StoreError> {
        let mut found: Vec<ReportRow> = self
            .lock()
            .values()
            .filter(|row| &row.fingerprint == fingerprint)
            .cloned()
            .collect();
        sort_oldest_first(&mut found);
        Ok(found)
    }

    async fn rows(&self) -> Result<Vec<ReportRow>, StoreError> {
        Ok(self.lock().values().cloned().collect())
    }
}
