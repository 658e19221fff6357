//! The report store boundary.

use crate::error::StoreError;
use crate::row::{CacheKey, ReportRow};
use async_trait::async_trait;
use dfr_kernel::Fingerprint;

/// Result of an insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another writer got there first; this is their row.
    Existing(Box<ReportRow>),
}

/// Durable report rows, unique per [`CacheKey`].
///
/// `insert_if_absent` is the uniqueness backstop: a store must never hold two
/// rows for one key, and a losing writer gets the winner's row back instead
/// of an error.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<ReportRow>, StoreError>;

    async fn insert_if_absent(&self, row: ReportRow) -> Result<InsertOutcome, StoreError>;

    /// Every row for a fingerprint, across engine versions, oldest first.
    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<ReportRow>, StoreError>;

    async fn rows(&self) -> Result<Vec<ReportRow>, StoreError>;
}

pub(crate) fn sort_oldest_first(rows: &mut [ReportRow]) {
    rows.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.engine_version.cmp(&b.engine_version))
    });
}
