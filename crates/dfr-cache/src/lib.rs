//! # dfr-cache
//!
//! Keyed by (fingerprint, engine version), the cache guarantees that a
//! report is computed at most once per key inside a process and stored at
//! most once across processes.
//!
//! `DfrService` wires the full request path:
//!
//! ```text
//! raw plan → CanonicalPlan::prepare → ResultCache::get_or_compute
//!          → (miss) evaluate → insert_if_absent → ReportEnvelope
//! ```

pub mod service;
pub mod single_flight;

pub use service::{DfrService, ServiceConfig};
pub use single_flight::{CacheOutcome, DEFAULT_PERSIST_TIMEOUT, ResultCache};
