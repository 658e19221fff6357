//! Append-only audit trail of evaluation requests.

use crate::error::StoreError;
use crate::jsonl::{append_row_to_path, read_rows_from_path};
use crate::jsonl_store::blocking;
use crate::lock::{LOCK_RETRY_ATTEMPTS, LOCK_RETRY_DELAY, StoreLockGuard};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dfr_kernel::{EngineVersion, Fingerprint};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

/// How one request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    ComputedPassed,
    ComputedFailed,
    CacheHit,
    /// Computed, but another writer stored the row first.
    CacheHitRace,
    Rejected,
    SystemError,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::ComputedPassed => "computed_passed",
            AuditStatus::ComputedFailed => "computed_failed",
            AuditStatus::CacheHit => "cache_hit",
            AuditStatus::CacheHitRace => "cache_hit_race",
            AuditStatus::Rejected => "rejected",
            AuditStatus::SystemError => "system_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub request_id: Uuid,
    /// Absent when the plan was rejected before it could be fingerprinted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    pub engine_version: EngineVersion,
    pub status: AuditStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violations_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        request_id: Uuid,
        fingerprint: Option<Fingerprint>,
        engine_version: EngineVersion,
        status: AuditStatus,
    ) -> Self {
        Self {
            request_id,
            fingerprint,
            engine_version,
            status,
            violations_count: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_violations(mut self, count: usize) -> Self {
        self.violations_count = Some(count);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError>;

    async fn entries(&self) -> Result<Vec<AuditEntry>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }
}

/// One JSON line per entry, appended under the store lock.
#[derive(Debug)]
pub struct JsonlAuditLog {
    path: PathBuf,
}

impl JsonlAuditLog {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuditLog for JsonlAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        let path = self.path.clone();
        blocking(move || {
            let _guard = StoreLockGuard::acquire(&path, LOCK_RETRY_ATTEMPTS, LOCK_RETRY_DELAY)?;
            append_row_to_path(&path, &entry)?;
            Ok(())
        })
        .await
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        let path = self.path.clone();
        blocking(move || Ok(read_rows_from_path(&path)?)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonl::temp_path;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&AuditStatus::CacheHitRace).expect("serializable");
        assert_eq!(json, "\"cache_hit_race\"");
        assert_eq!(AuditStatus::CacheHitRace.as_str(), "cache_hit_race");
    }

    #[tokio::test]
    async fn jsonl_audit_log_appends_entries() {
        let path = temp_path("audit");
        let log = JsonlAuditLog::open(&path);
        let version = EngineVersion::new("1+test");

        log.record(
            AuditEntry::new(Uuid::new_v4(), None, version.clone(), AuditStatus::Rejected)
                .with_detail("malformed plan"),
        )
        .await
        .expect("first append");
        log.record(
            AuditEntry::new(
                Uuid::new_v4(),
                Some(Fingerprint::of_bytes(b"plan")),
                version,
                AuditStatus::ComputedFailed,
            )
            .with_violations(2),
        )
        .await
        .expect("second append");

        let entries = log.entries().await.expect("read back");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, AuditStatus::Rejected);
        assert!(entries[0].fingerprint.is_none());
        assert_eq!(entries[1].violations_count, Some(2));

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
