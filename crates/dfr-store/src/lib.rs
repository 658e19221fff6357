//! # dfr-store
//!
//! Persistence for DFR reports.
//!
//! - `ReportRow`: one stored evaluation, unique per (fingerprint, engine version)
//! - `ReportStore`: async store boundary with insert-if-absent
//! - `MemoryReportStore` / `JsonlReportStore`: the two backends
//! - `AuditLog`: append-only request trail
//! - `Stats`: dashboard aggregates over stored rows
//!
//! ```text
//! JSONL (on disk, one row per line)   <path>.lock guards writers
//!     ↕  spawn_blocking
//! JsonlReportStore
//! ```

pub mod audit;
pub mod error;
pub mod jsonl;
pub mod jsonl_store;
pub mod lock;
pub mod memory;
pub mod row;
pub mod stats;
pub mod store;

pub use audit::{AuditEntry, AuditLog, AuditStatus, JsonlAuditLog, MemoryAuditLog};
pub use error::StoreError;
pub use jsonl::JsonlError;
pub use jsonl_store::JsonlReportStore;
pub use lock::{StoreLockGuard, lock_path};
pub use memory::MemoryReportStore;
pub use row::{CacheKey, ReportRow};
pub use stats::{RecentReport, RuleFrequency, Stats};
pub use store::{InsertOutcome, ReportStore};
