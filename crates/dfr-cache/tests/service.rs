//! End-to-end service behavior: caching, single-flight, isolation, failures.

use async_trait::async_trait;
use dfr_cache::{CacheOutcome, DfrService, ResultCache, ServiceConfig};
use dfr_kernel::{CanonicalPlan, EngineError, EngineVersion, Fingerprint, evaluate};
use dfr_store::{
    AuditLog, AuditStatus, CacheKey, InsertOutcome, JsonlReportStore, MemoryAuditLog,
    MemoryReportStore, ReportRow, ReportStore, StoreError,
};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn method_mismatch_plan() -> Value {
    json!({
        "schema_version": "1.0",
        "project_name": "accounts",
        "components": [
            {"id": "web", "name": "Web", "type": "frontend", "path": "apps/web"},
            {"id": "api", "name": "API", "type": "backend", "path": "services/api", "resources": [
                {"id": "get_user", "type": "api", "name": "Get user", "properties": {
                    "method": "GET", "path": "/users",
                    "request_schema": "UserQuery", "response_schema": "User"}}
            ]}
        ],
        "relationships": [
            {"source": "web", "target": "api", "type": "calls",
             "metadata": {"method": "POST", "path": "/users"}}
        ]
    })
}

fn service_with(
    store: Arc<dyn ReportStore>,
    audit: Arc<MemoryAuditLog>,
    version: &str,
    timeout: Duration,
) -> DfrService {
    DfrService::new(
        store,
        audit,
        ServiceConfig {
            persist_timeout: timeout,
            engine_version: EngineVersion::new(version),
        },
    )
}

fn memory_service() -> (DfrService, Arc<MemoryReportStore>, Arc<MemoryAuditLog>) {
    let store = Arc::new(MemoryReportStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let service = service_with(store.clone(), audit.clone(), "1+test", Duration::from_secs(5));
    (service, store, audit)
}

async fn statuses(audit: &MemoryAuditLog) -> Vec<AuditStatus> {
    audit
        .entries()
        .await
        .expect("audit entries")
        .into_iter()
        .map(|e| e.status)
        .collect()
}

#[tokio::test]
async fn second_submission_is_a_cache_hit() {
    let (service, store, audit) = memory_service();

    let first = service
        .validate_value(&method_mismatch_plan())
        .await
        .expect("first");
    let second = service
        .validate_value(&method_mismatch_plan())
        .await
        .expect("second");

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.report, second.report);
    assert!(!first.report.passed);
    assert_eq!(first.report.violations.len(), 1);
    assert_eq!(first.report.violations[0].rule_id, "API_METHOD_MATCH_001");
    assert_eq!(store.len(), 1);
    assert_eq!(
        statuses(&audit).await,
        vec![AuditStatus::ComputedFailed, AuditStatus::CacheHit]
    );
}

#[tokio::test]
async fn raw_text_and_value_share_a_cache_entry() {
    let (service, store, _) = memory_service();
    let raw = serde_json::to_string_pretty(&method_mismatch_plan()).expect("serializable");

    let from_text = service.validate_str(&raw).await.expect("text");
    let from_value = service
        .validate_value(&method_mismatch_plan())
        .await
        .expect("value");
    assert!(from_value.cache_hit);
    assert_eq!(from_text.report.fingerprint, from_value.report.fingerprint);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn malformed_plan_is_rejected_and_not_cached() {
    let (service, store, audit) = memory_service();
    let mut plan = method_mismatch_plan();
    plan["relationships"][0]["target"] = json!("billing");

    let err = service.validate_value(&plan).await.expect_err("must reject");
    match &err {
        EngineError::MalformedPlan(malformed) => {
            assert_eq!(malformed.issues[0].path, "relationships[0].target");
        }
        other => panic!("expected malformed plan, got {other:?}"),
    }
    assert!(store.is_empty());
    assert_eq!(statuses(&audit).await, vec![AuditStatus::Rejected]);

    let err = service.validate_str("{ nope").await.expect_err("must reject");
    assert_eq!(err.category(), "malformed_plan");
    assert!(store.is_empty());
}

#[tokio::test]
async fn engine_versions_never_share_rows() {
    let store = Arc::new(MemoryReportStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let v1 = service_with(store.clone(), audit.clone(), "1+aaaa", Duration::from_secs(5));
    let v2 = service_with(store.clone(), audit.clone(), "2+bbbb", Duration::from_secs(5));

    let a = v1.validate_value(&method_mismatch_plan()).await.expect("v1");
    let b = v2.validate_value(&method_mismatch_plan()).await.expect("v2");

    assert!(!a.cache_hit);
    assert!(!b.cache_hit, "v2 must not be served v1's row");
    assert_eq!(a.report.fingerprint, b.report.fingerprint);
    assert_eq!(a.report.engine_version.as_str(), "1+aaaa");
    assert_eq!(b.report.engine_version.as_str(), "2+bbbb");
    assert_eq!(store.len(), 2);

    let history = v1.history(&a.report.fingerprint).await.expect("history");
    assert_eq!(history.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_requests_compute_once() {
    let (service, store, audit) = memory_service();
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.validate_value(&method_mismatch_plan()).await
        }));
    }

    let mut reports = Vec::new();
    for handle in handles {
        reports.push(handle.await.expect("task").expect("validation"));
    }

    assert_eq!(store.len(), 1);
    assert_eq!(reports.iter().filter(|r| !r.cache_hit).count(), 1);
    assert!(reports.iter().all(|r| r.report == reports[0].report));

    let computed = statuses(&audit)
        .await
        .into_iter()
        .filter(|s| matches!(s, AuditStatus::ComputedPassed | AuditStatus::ComputedFailed))
        .count();
    assert_eq!(computed, 1);
    assert_eq!(service.cache().in_flight_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_flight_runs_one_slow_computation() {
    let cache = Arc::new(ResultCache::new(
        Arc::new(MemoryReportStore::new()),
        Duration::from_secs(5),
    ));
    let prepared = Arc::new(CanonicalPlan::prepare(&method_mismatch_plan()).expect("valid"));
    let version = EngineVersion::new("1+slow");
    let key = CacheKey::new(prepared.fingerprint.clone(), version.clone());
    let computations = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let prepared = prepared.clone();
        let version = version.clone();
        let key = key.clone();
        let computations = computations.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute(&key, move || {
                    computations.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(50));
                    let now = chrono::Utc::now();
                    let report = evaluate(&prepared, &version, now)?;
                    Ok(ReportRow::new(&prepared, report, now))
                })
                .await
        }));
    }

    let mut computed = 0;
    for handle in handles {
        match handle.await.expect("task").expect("outcome") {
            CacheOutcome::Computed(_) => computed += 1,
            CacheOutcome::Hit(_) | CacheOutcome::RaceLost(_) => {}
        }
    }
    assert_eq!(computed, 1);
    assert_eq!(computations.load(Ordering::SeqCst), 1);
}

/// Delays every read past the service's persistence timeout.
struct SlowStore(MemoryReportStore);

#[async_trait]
impl ReportStore for SlowStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<ReportRow>, StoreError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.0.get(key).await
    }

    async fn insert_if_absent(&self, row: ReportRow) -> Result<InsertOutcome, StoreError> {
        self.0.insert_if_absent(row).await
    }

    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<ReportRow>, StoreError> {
        self.0.find_by_fingerprint(fingerprint).await
    }

    async fn rows(&self) -> Result<Vec<ReportRow>, StoreError> {
        self.0.rows().await
    }
}

#[tokio::test]
async fn persistence_timeout_is_a_system_error() {
    let store = Arc::new(SlowStore(MemoryReportStore::new()));
    let audit = Arc::new(MemoryAuditLog::new());
    let service = service_with(store.clone(), audit.clone(), "1+test", Duration::from_millis(20));

    let err = service
        .validate_value(&method_mismatch_plan())
        .await
        .expect_err("timeout must surface");
    assert_eq!(err.category(), "system_error");
    assert!(err.to_string().contains("timed out"));
    assert!(store.0.is_empty());
    assert_eq!(statuses(&audit).await, vec![AuditStatus::SystemError]);
}

/// Hides rows from reads, as if another process inserted between this
/// process's lookup and its write.
struct StaleReadStore(MemoryReportStore);

#[async_trait]
impl ReportStore for StaleReadStore {
    async fn get(&self, _key: &CacheKey) -> Result<Option<ReportRow>, StoreError> {
        Ok(None)
    }

    async fn insert_if_absent(&self, row: ReportRow) -> Result<InsertOutcome, StoreError> {
        self.0.insert_if_absent(row).await
    }

    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<ReportRow>, StoreError> {
        self.0.find_by_fingerprint(fingerprint).await
    }

    async fn rows(&self) -> Result<Vec<ReportRow>, StoreError> {
        self.0.rows().await
    }
}

#[tokio::test]
async fn losing_an_insert_race_serves_the_winners_row() {
    let store = Arc::new(StaleReadStore(MemoryReportStore::new()));
    let audit = Arc::new(MemoryAuditLog::new());
    let service = service_with(store.clone(), audit.clone(), "1+test", Duration::from_secs(5));

    let first = service
        .validate_value(&method_mismatch_plan())
        .await
        .expect("first");
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = service
        .validate_value(&method_mismatch_plan())
        .await
        .expect("second");

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    // The winner's row, including its timestamp, is what the loser returns.
    assert_eq!(first.report, second.report);
    assert_eq!(store.0.len(), 1);
    assert_eq!(
        statuses(&audit).await,
        vec![AuditStatus::ComputedFailed, AuditStatus::CacheHitRace]
    );
}

#[tokio::test]
async fn jsonl_backed_service_survives_restart() {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after unix epoch")
        .as_nanos();
    let dir: PathBuf = std::env::temp_dir().join(format!(
        "dfr-cache-it-{}-{unique}",
        std::process::id()
    ));
    let path = dir.join("reports.jsonl");

    let first = {
        let service = service_with(
            Arc::new(JsonlReportStore::open(&path)),
            Arc::new(MemoryAuditLog::new()),
            "1+test",
            Duration::from_secs(5),
        );
        service
            .validate_value(&method_mismatch_plan())
            .await
            .expect("first")
    };

    let restarted = service_with(
        Arc::new(JsonlReportStore::open(&path)),
        Arc::new(MemoryAuditLog::new()),
        "1+test",
        Duration::from_secs(5),
    );
    let second = restarted
        .validate_value(&method_mismatch_plan())
        .await
        .expect("second");
    assert!(second.cache_hit);
    assert_eq!(first.report, second.report);

    let stats = restarted.stats().await.expect("stats");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.top_rules[0].rule_id, "API_METHOD_MATCH_001");

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn uncached_evaluation_leaves_the_store_alone() {
    let (service, store, audit) = memory_service();
    let raw = method_mismatch_plan().to_string();

    let envelope = service.evaluate_uncached(&raw).expect("evaluation");
    assert!(!envelope.cache_hit);
    assert_eq!(envelope.report.violations.len(), 1);
    assert!(store.is_empty());
    assert!(statuses(&audit).await.is_empty());
}
