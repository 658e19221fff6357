//! Aggregate statistics over stored reports.

use crate::row::ReportRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RECENT_LIMIT: usize = 5;
pub const TOP_RULES_LIMIT: usize = 5;
/// Rule frequencies are taken over this many most recent failing rows.
pub const TOP_RULES_WINDOW: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentReport {
    pub fingerprint: String,
    pub engine_version: String,
    pub passed: bool,
    pub violations: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFrequency {
    pub rule_id: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub recent: Vec<RecentReport>,
    pub top_rules: Vec<RuleFrequency>,
}

impl Stats {
    pub fn from_rows(rows: &[ReportRow]) -> Self {
        let mut newest_first: Vec<&ReportRow> = rows.iter().collect();
        newest_first.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
                .then_with(|| a.engine_version.cmp(&b.engine_version))
        });

        let passed = rows.iter().filter(|r| r.report.passed).count();

        let recent = newest_first
            .iter()
            .take(RECENT_LIMIT)
            .map(|row| RecentReport {
                fingerprint: row.fingerprint.short().to_string(),
                engine_version: row.engine_version.to_string(),
                passed: row.report.passed,
                violations: row.report.violations.len(),
                created_at: row.created_at,
            })
            .collect();

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for row in newest_first
            .iter()
            .filter(|r| !r.report.passed)
            .take(TOP_RULES_WINDOW)
        {
            for violation in &row.report.violations {
                *counts.entry(violation.rule_id.as_str()).or_default() += 1;
            }
        }
        let mut top: Vec<(&str, usize)> = counts.into_iter().collect();
        // Count descending; BTreeMap order breaks ties by rule id.
        top.sort_by(|a, b| b.1.cmp(&a.1));
        let top_rules = top
            .into_iter()
            .take(TOP_RULES_LIMIT)
            .map(|(rule_id, count)| RuleFrequency {
                rule_id: rule_id.to_string(),
                count,
            })
            .collect();

        Self {
            total: rows.len(),
            passed,
            failed: rows.len() - passed,
            recent,
            top_rules,
        }
    }
}
