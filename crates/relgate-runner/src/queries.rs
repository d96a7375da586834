use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use relgate_core::{
    compare_subject_versions, CheckStatus, HealthRecord, HealthSummary, RecordKind, SessionId, StoreError,
    ValidationRecord,
};
use relgate_storage::{LogStore, LogStoreExt};
use serde::Serialize;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct FailedCheck {
    pub timestamp: DateTime<Utc>,
    pub script_name: String,
    pub subject_version: String,
    pub check: String,
    pub error: Option<String>,
    pub exit_code: i32,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TrendPoint {
    pub subject_version: String,
    pub runs: u32,
    pub passed_runs: u32,
    pub failed_runs: u32,
    /// Counts from the latest run for the version.
    pub checks_passed: u32,
    pub checks_failed: u32,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct HealthDelta {
    pub ok: i64,
    pub warn: i64,
    pub critical: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct HealthTrendPoint {
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
    pub summary: HealthSummary,
    /// Versus the previous health record; absent for the first.
    pub delta: Option<HealthDelta>,
}

/// Read-only views over the logs.
pub struct History<'a> {
    store: &'a dyn LogStore,
}

impl<'a> History<'a> {
    pub fn new(store: &'a dyn LogStore) -> Self {
        Self { store }
    }

    /// Every failing check recorded for the version, in append order. A run
    /// that exited non-zero without naming a failing check is reported under
    /// the script's own name.
    pub fn failures_for_version(&self, subject_version: &str) -> Result<Vec<FailedCheck>, StoreError> {
        let runs = self.store.read_filtered(|r: &ValidationRecord| r.subject_version == subject_version)?;
        let mut out = Vec::new();
        for run in runs {
            let entry = |check: &str, error: Option<String>| FailedCheck {
                timestamp: run.header.timestamp,
                script_name: run.script_name.clone(),
                subject_version: run.subject_version.clone(),
                check: check.to_string(),
                error,
                exit_code: run.exit_code,
            };
            let failing: Vec<FailedCheck> = run.failing_checks().map(|c| entry(&c.name, c.error.clone())).collect();
            if failing.is_empty() && run.exit_code != 0 {
                out.push(entry(&run.script_name, Some(format!("exit code {}", run.exit_code))));
            }
            out.extend(failing);
        }
        Ok(out)
    }

    pub fn validation_trend(&self, script_name: &str) -> Result<Vec<TrendPoint>, StoreError> {
        let runs = self.store.read_filtered(|r: &ValidationRecord| r.script_name == script_name)?;
        let mut by_version: BTreeMap<String, TrendPoint> = BTreeMap::new();
        for run in runs {
            let point = by_version.entry(run.subject_version.clone()).or_insert_with(|| TrendPoint {
                subject_version: run.subject_version.clone(),
                runs: 0,
                passed_runs: 0,
                failed_runs: 0,
                checks_passed: 0,
                checks_failed: 0,
            });
            point.runs += 1;
            if run.succeeded() {
                point.passed_runs += 1;
            } else {
                point.failed_runs += 1;
            }
            point.checks_passed = run.checks_passed;
            point.checks_failed = run.checks_failed;
        }
        let mut points: Vec<TrendPoint> = by_version.into_values().collect();
        points.sort_by(|a, b| compare_subject_versions(&a.subject_version, &b.subject_version));
        Ok(points)
    }

    /// Checks that passed in the latest `from` run of the script but fail in
    /// the latest `to` run. `None` when either version has no run.
    pub fn regressions(&self, script_name: &str, from: &str, to: &str) -> Result<Option<Vec<String>>, StoreError> {
        let latest = |version: &str| {
            self.store.read_latest(|r: &ValidationRecord| r.script_name == script_name && r.subject_version == version)
        };
        let (Some(before), Some(after)) = (latest(from)?, latest(to)?) else {
            return Ok(None);
        };
        let passed_before: Vec<&str> = before
            .check_details
            .iter()
            .filter(|c| c.status == CheckStatus::Pass)
            .map(|c| c.name.as_str())
            .collect();
        Ok(Some(
            after.failing_checks().filter(|c| passed_before.contains(&c.name.as_str())).map(|c| c.name.clone()).collect(),
        ))
    }

    pub fn health_trend(&self) -> Result<Vec<HealthTrendPoint>, StoreError> {
        let records: Vec<HealthRecord> = self.store.read_all()?;
        let mut prev: Option<HealthSummary> = None;
        let mut out = Vec::with_capacity(records.len());
        for rec in records {
            let delta = prev.map(|p| HealthDelta {
                ok: i64::from(rec.summary.ok) - i64::from(p.ok),
                warn: i64::from(rec.summary.warn) - i64::from(p.warn),
                critical: i64::from(rec.summary.critical) - i64::from(p.critical),
            });
            prev = Some(rec.summary);
            out.push(HealthTrendPoint { timestamp: rec.header.timestamp, session_id: rec.session_id, summary: rec.summary, delta });
        }
        Ok(out)
    }

    /// Record count per kind.
    pub fn status(&self) -> Result<Vec<(RecordKind, usize)>, StoreError> {
        RecordKind::ALL.iter().map(|&kind| Ok((kind, self.store.count(kind)?))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_core::{CheckDetail, HealthCheck, HealthStatus};
    use relgate_storage::InMemoryLogStore;

    fn run(store: &InMemoryLogStore, script: &str, version: &str, checks: Vec<CheckDetail>) {
        let exit = i32::from(checks.iter().any(|c| c.status == CheckStatus::Fail));
        store.append(&ValidationRecord::new(script, version, exit, checks)).unwrap();
    }

    fn eleven_and_one() -> Vec<CheckDetail> {
        let mut checks: Vec<CheckDetail> = (1..=11).map(|i| CheckDetail::pass(format!("check_{i:02}"))).collect();
        checks.push(CheckDetail::fail("registry_version_marker", "expected 3.6.0, found 3.5.0"));
        checks
    }

    #[test]
    fn failing_check_is_named_in_version_failures() {
        let store = InMemoryLogStore::new();
        run(&store, "post_release_validation", "3.6.0", eleven_and_one());
        run(&store, "post_release_validation", "3.5.0", vec![CheckDetail::fail("other", "x")]);

        let failures = History::new(&store).failures_for_version("3.6.0").unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].script_name, "post_release_validation");
        assert_eq!(failures[0].check, "registry_version_marker");
        assert_eq!(failures[0].exit_code, 1);
    }

    #[test]
    fn nonzero_exit_without_details_is_a_failure() {
        let store = InMemoryLogStore::new();
        store.append(&ValidationRecord::new("smoke", "3.6.0", 2, vec![])).unwrap();
        let failures = History::new(&store).failures_for_version("3.6.0").unwrap();
        assert_eq!(failures[0].check, "smoke");
        assert_eq!(failures[0].error.as_deref(), Some("exit code 2"));
    }

    #[test]
    fn trend_is_ordered_by_semver() {
        let store = InMemoryLogStore::new();
        run(&store, "s", "3.10.0", vec![CheckDetail::pass("a")]);
        run(&store, "s", "3.9.0", vec![CheckDetail::fail("a", "x")]);
        run(&store, "s", "3.9.0", vec![CheckDetail::pass("a")]);
        let trend = History::new(&store).validation_trend("s").unwrap();
        let versions: Vec<&str> = trend.iter().map(|p| p.subject_version.as_str()).collect();
        assert_eq!(versions, vec!["3.9.0", "3.10.0"]);
        assert_eq!((trend[0].runs, trend[0].passed_runs, trend[0].failed_runs), (2, 1, 1));
        assert_eq!(trend[0].checks_failed, 0);
    }

    #[test]
    fn regressions_compare_latest_runs() {
        let store = InMemoryLogStore::new();
        let history = History::new(&store);
        run(&store, "s", "3.5.0", vec![CheckDetail::pass("a"), CheckDetail::pass("b"), CheckDetail::fail("c", "x")]);
        assert_eq!(history.regressions("s", "3.5.0", "3.6.0").unwrap(), None);
        run(&store, "s", "3.6.0", vec![CheckDetail::pass("a"), CheckDetail::fail("b", "y"), CheckDetail::fail("c", "x")]);
        assert_eq!(history.regressions("s", "3.5.0", "3.6.0").unwrap(), Some(vec!["b".to_string()]));
    }

    #[test]
    fn health_trend_reports_deltas() {
        let store = InMemoryLogStore::new();
        let check = |status| HealthCheck { name: "disk".into(), status, details: String::new() };
        store.append(&HealthRecord::new(SessionId::new("a"), vec![check(HealthStatus::Ok), check(HealthStatus::Ok)])).unwrap();
        store.append(&HealthRecord::new(SessionId::new("b"), vec![check(HealthStatus::Ok), check(HealthStatus::Critical)])).unwrap();
        let trend = History::new(&store).health_trend().unwrap();
        assert_eq!(trend[0].delta, None);
        assert_eq!(trend[1].delta, Some(HealthDelta { ok: -1, warn: 0, critical: 1 }));
    }

    #[test]
    fn status_counts_every_kind() {
        let store = InMemoryLogStore::new();
        run(&store, "s", "3.6.0", vec![]);
        let status = History::new(&store).status().unwrap();
        assert_eq!(status.len(), 5);
        assert_eq!(status[0], (RecordKind::Validation, 1));
        assert!(status[1..].iter().all(|(_, n)| *n == 0));
    }
}
