//! JSONL-backed report store.
//!
//! Writers inside one process queue on an async gate; writers in different
//! processes serialize on the lock file. Under both, an insert re-reads the
//! file and, when the key is still absent, rewrites it atomically (temp file,
//! fsync, rename) with the new row last. Readers never see a partial line.

use crate::error::StoreError;
use crate::jsonl::{read_rows_from_path, write_rows_to_path};
use crate::lock::{LOCK_RETRY_ATTEMPTS, LOCK_RETRY_DELAY, StoreLockGuard};
use crate::row::{CacheKey, ReportRow};
use crate::store::{InsertOutcome, ReportStore, sort_oldest_first};
use async_trait::async_trait;
use dfr_kernel::Fingerprint;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct JsonlReportStore {
    path: PathBuf,
    gate: Mutex<()>,
}

impl JsonlReportStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<ReportRow>, StoreError> {
        let path = self.path.clone();
        blocking(move || Ok(read_rows_from_path(&path)?)).await
    }
}

#[async_trait]
impl ReportStore for JsonlReportStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<ReportRow>, StoreError> {
        let rows = self.read_all().await?;
        Ok(rows.into_iter().find(|row| row.matches(key)))
    }

    async fn insert_if_absent(&self, row: ReportRow) -> Result<InsertOutcome, StoreError> {
        let _gate = self.gate.lock().await;
        let path = self.path.clone();
        let key = row.key();

        let outcome = blocking(move || {
            let _guard = StoreLockGuard::acquire(&path, LOCK_RETRY_ATTEMPTS, LOCK_RETRY_DELAY)?;
            let mut rows: Vec<ReportRow> = read_rows_from_path(&path)?;
            if let Some(existing) = rows.iter().find(|r| r.matches(&row.key())) {
                return Ok(InsertOutcome::Existing(Box::new(existing.clone())));
            }
            rows.push(row);
            write_rows_to_path(&path, &rows)?;
            Ok(InsertOutcome::Inserted)
        })
        .await?;

        match &outcome {
            InsertOutcome::Inserted => tracing::debug!(key = %key, "report row inserted"),
            InsertOutcome::Existing(_) => {
                tracing::debug!(key = %key, "report row already present")
            }
        }
        Ok(outcome)
    }

    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<ReportRow>, StoreError> {
        let mut found: Vec<ReportRow> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|row| &row.fingerprint == fingerprint)
            .collect();
        sort_oldest_first(&mut found);
        Ok(found)
    }

    async fn rows(&self) -> Result<Vec<ReportRow>, StoreError> {
        self.read_all().await
    }
}

/// Run file I/O off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}
