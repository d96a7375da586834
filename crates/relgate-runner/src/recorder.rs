use relgate_core::{CheckDetail, CheckStatus, HealthCheck, HealthRecord, SessionId, StoreError, ValidationRecord};
use relgate_storage::{LogStore, LogStoreExt};

/// Shell convention for "command could not be run".
pub const INVOCATION_FAILED_EXIT: i32 = 127;

/// What an external validation unit produced. The recorder never decides
/// pass/fail itself; it only persists this.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationOutcome {
    pub exit_code: i32,
    pub checks: Vec<CheckDetail>,
}

impl ValidationOutcome {
    pub fn new(exit_code: i32, checks: Vec<CheckDetail>) -> Self {
        Self { exit_code, checks }
    }

    /// Exit code 1 if any check failed, else 0.
    pub fn from_checks(checks: Vec<CheckDetail>) -> Self {
        let exit_code = i32::from(checks.iter().any(|c| c.status == CheckStatus::Fail));
        Self { exit_code, checks }
    }

    pub fn invocation_failed(script_name: &str, err: impl std::fmt::Display) -> Self {
        Self {
            exit_code: INVOCATION_FAILED_EXIT,
            checks: vec![CheckDetail::fail(script_name, format!("could not invoke validation: {err}"))],
        }
    }
}

pub struct ValidationRecorder<'a> {
    store: &'a dyn LogStore,
}

impl<'a> ValidationRecorder<'a> {
    pub fn new(store: &'a dyn LogStore) -> Self {
        Self { store }
    }

    /// Appends exactly one record per call. Retries accumulate.
    pub fn record(&self, script_name: &str, subject_version: &str, outcome: ValidationOutcome) -> Result<ValidationRecord, StoreError> {
        let rec = ValidationRecord::new(script_name, subject_version, outcome.exit_code, outcome.checks);
        let seq = self.store.append(&rec)?;
        tracing::info!(
            script = script_name,
            version = subject_version,
            exit_code = rec.exit_code,
            passed = rec.checks_passed,
            failed = rec.checks_failed,
            seq,
            "validation recorded"
        );
        Ok(rec)
    }
}

/// Health snapshots are for trend comparison only and never block.
pub struct HealthRecorder<'a> {
    store: &'a dyn LogStore,
}

impl<'a> HealthRecorder<'a> {
    pub fn new(store: &'a dyn LogStore) -> Self {
        Self { store }
    }

    pub fn record(&self, session_id: SessionId, checks: Vec<HealthCheck>) -> Result<HealthRecord, StoreError> {
        let rec = HealthRecord::new(session_id, checks);
        self.store.append(&rec)?;
        tracing::info!(
            session = %rec.session_id,
            ok = rec.summary.ok,
            warn = rec.summary.warn,
            critical = rec.summary.critical,
            "health recorded"
        );
        Ok(rec)
    }
}
