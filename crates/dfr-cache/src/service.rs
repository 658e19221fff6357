//! The evaluation service: canonicalize, consult the cache, evaluate on a
//! miss, audit the outcome.

use crate::single_flight::{CacheOutcome, DEFAULT_PERSIST_TIMEOUT, ResultCache};
use chrono::Utc;
use dfr_kernel::{
    CanonicalPlan, EngineError, EngineVersion, Fingerprint, MalformedPlan, ReportEnvelope, evaluate,
};
use dfr_store::{AuditEntry, AuditLog, AuditStatus, CacheKey, ReportRow, ReportStore, Stats};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub persist_timeout: Duration,
    pub engine_version: EngineVersion,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            persist_timeout: DEFAULT_PERSIST_TIMEOUT,
            engine_version: EngineVersion::current().clone(),
        }
    }
}

pub struct DfrService {
    cache: ResultCache,
    audit: Arc<dyn AuditLog>,
    engine_version: EngineVersion,
}

impl DfrService {
    pub fn new(store: Arc<dyn ReportStore>, audit: Arc<dyn AuditLog>, config: ServiceConfig) -> Self {
        Self {
            cache: ResultCache::new(store, config.persist_timeout),
            audit,
            engine_version: config.engine_version,
        }
    }

    pub fn engine_version(&self) -> &EngineVersion {
        &self.engine_version
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Validate raw JSON text.
    pub async fn validate_str(&self, raw: &str) -> Result<ReportEnvelope, EngineError> {
        let request_id = Uuid::new_v4();
        let prepared = match CanonicalPlan::prepare_str(raw) {
            Ok(prepared) => prepared,
            Err(err) => return Err(self.rejected(request_id, err).await),
        };
        self.validate_prepared(request_id, prepared).await
    }

    /// Validate an already-parsed JSON document.
    pub async fn validate_value(&self, raw: &Value) -> Result<ReportEnvelope, EngineError> {
        let request_id = Uuid::new_v4();
        let prepared = match CanonicalPlan::prepare(raw) {
            Ok(prepared) => prepared,
            Err(err) => return Err(self.rejected(request_id, err).await),
        };
        self.validate_prepared(request_id, prepared).await
    }

    /// Evaluate raw JSON text without reading or writing the cache.
    pub fn evaluate_uncached(&self, raw: &str) -> Result<ReportEnvelope, EngineError> {
        let prepared = CanonicalPlan::prepare_str(raw)?;
        let report = evaluate(&prepared, &self.engine_version, Utc::now())?;
        Ok(ReportEnvelope {
            report,
            cache_hit: false,
        })
    }

    async fn validate_prepared(
        &self,
        request_id: Uuid,
        prepared: CanonicalPlan,
    ) -> Result<ReportEnvelope, EngineError> {
        let key = CacheKey::new(prepared.fingerprint.clone(), self.engine_version.clone());
        let span = tracing::info_span!(
            "validate",
            %request_id,
            fingerprint = %prepared.fingerprint.short(),
            engine_version = %self.engine_version,
        );

        async {
            let outcome = self
                .cache
                .get_or_compute(&key, || {
                    let now = Utc::now();
                    let report = evaluate(&prepared, &self.engine_version, now)?;
                    Ok(ReportRow::new(&prepared, report, now))
                })
                .await;

            match outcome {
                Ok(outcome) => {
                    let status = match &outcome {
                        CacheOutcome::Hit(_) => AuditStatus::CacheHit,
                        CacheOutcome::RaceLost(_) => AuditStatus::CacheHitRace,
                        CacheOutcome::Computed(row) if row.report.passed => {
                            AuditStatus::ComputedPassed
                        }
                        CacheOutcome::Computed(_) => AuditStatus::ComputedFailed,
                    };
                    let cache_hit = outcome.is_hit();
                    let report = outcome.into_row().report;
                    tracing::info!(
                        status = status.as_str(),
                        passed = report.passed,
                        violations = report.violations.len(),
                        "plan validated"
                    );
                    self.record(
                        AuditEntry::new(
                            request_id,
                            Some(report.fingerprint.clone()),
                            self.engine_version.clone(),
                            status,
                        )
                        .with_violations(report.violations.len()),
                    )
                    .await;
                    Ok(ReportEnvelope { report, cache_hit })
                }
                Err(err) => {
                    tracing::error!(category = err.category(), error = %err, "validation failed");
                    let status = if err.is_input_rejection() {
                        AuditStatus::Rejected
                    } else {
                        AuditStatus::SystemError
                    };
                    self.record(
                        AuditEntry::new(
                            request_id,
                            Some(prepared.fingerprint.clone()),
                            self.engine_version.clone(),
                            status,
                        )
                        .with_detail(err.to_string()),
                    )
                    .await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn rejected(&self, request_id: Uuid, err: MalformedPlan) -> EngineError {
        tracing::info!(
            %request_id,
            issues = err.issues.len(),
            "plan rejected"
        );
        self.record(
            AuditEntry::new(request_id, None, self.engine_version.clone(), AuditStatus::Rejected)
                .with_detail(err.to_string()),
        )
        .await;
        err.into()
    }

    /// Audit failures are logged and otherwise ignored.
    async fn record(&self, entry: AuditEntry) {
        let request_id = entry.request_id;
        if let Err(err) = self.cache.bounded("audit", self.audit.record(entry)).await {
            tracing::warn!(%request_id, error = %err, "failed to record audit entry");
        }
    }

    /// Stored reports for a fingerprint, across engine versions.
    pub async fn history(&self, fingerprint: &Fingerprint) -> Result<Vec<ReportRow>, EngineError> {
        let store = self.cache.store();
        Ok(self
            .cache
            .bounded("read", store.find_by_fingerprint(fingerprint))
            .await?)
    }

    pub async fn stats(&self) -> Result<Stats, EngineError> {
        let store = self.cache.store();
        let rows = self.cache.bounded("read", store.rows()).await?;
        Ok(Stats::from_rows(&rows))
    }
}
