use crate::config::DfrConfig;
use dfr_cache::{DfrService, ServiceConfig};
use dfr_kernel::{EngineError, EngineVersion};
use dfr_store::{JsonlAuditLog, JsonlReportStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const EXIT_VIOLATIONS: i32 = 1;
pub const EXIT_REJECTED: i32 = 2;
pub const EXIT_SYSTEM: i32 = 3;

pub fn load_config_or_exit(config_arg: Option<&str>, store_arg: Option<&str>) -> DfrConfig {
    let mut config = DfrConfig::load(config_arg.map(Path::new)).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(EXIT_SYSTEM);
    });
    if let Some(store) = store_arg {
        config.store.reports_path = PathBuf::from(store);
    }
    config
}

pub fn runtime_or_exit() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            std::process::exit(EXIT_SYSTEM);
        })
}

pub fn open_service(config: &DfrConfig) -> DfrService {
    DfrService::new(
        Arc::new(JsonlReportStore::open(config.store.reports_path.clone())),
        Arc::new(JsonlAuditLog::open(config.store.audit_path.clone())),
        ServiceConfig {
            persist_timeout: config.store.persist_timeout(),
            engine_version: EngineVersion::current().clone(),
        },
    )
}

/// Read a plan document; an unreadable file is rejected input.
pub fn read_plan_or_exit(plan_arg: &str) -> String {
    std::fs::read_to_string(plan_arg).unwrap_or_else(|e| {
        eprintln!("error: failed to read {plan_arg}: {e}");
        std::process::exit(EXIT_REJECTED);
    })
}

pub fn exit_code_for(err: &EngineError) -> i32 {
    if err.is_input_rejection() {
        EXIT_REJECTED
    } else {
        EXIT_SYSTEM
    }
}

/// Report an engine error on the selected channel and exit.
pub fn fail_with(err: &EngineError, json_output: bool) -> ! {
    if json_output {
        print_json(&err.to_json());
    } else {
        eprintln!("error: {err}");
        if let EngineError::MalformedPlan(malformed) = err {
            for issue in &malformed.issues {
                eprintln!("  - {}: {}", issue.path, issue.message);
            }
        }
    }
    std::process::exit(exit_code_for(err));
}

pub fn print_json<T: Serialize + ?Sized>(payload: &T) {
    match serde_json::to_string_pretty(payload) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("error: failed to render JSON output: {e}");
            std::process::exit(EXIT_SYSTEM);
        }
    }
}
