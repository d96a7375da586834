use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ids::*;
use crate::model::*;

pub const SCHEMA_VERSION: u32 = 1;

/// Envelope shared by every persisted record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecordHeader {
    pub timestamp: DateTime<Utc>,
    pub record_kind: RecordKind,
    pub schema_version: u32,
}

impl RecordHeader {
    pub fn now(kind: RecordKind) -> Self {
        Self::at(kind, Utc::now())
    }

    pub fn at(kind: RecordKind, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, record_kind: kind, schema_version: SCHEMA_VERSION }
    }
}

/// A record type that owns one log partition.
pub trait LogRecord: Serialize + DeserializeOwned + Clone + Send {
    const KIND: RecordKind;

    fn header(&self) -> &RecordHeader;

    /// Release this record pertains to, when it has one.
    fn subject_version(&self) -> Option<&str>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CheckDetail {
    pub name: String,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckDetail {
    pub fn pass(name: impl Into<String>) -> Self {
        Self { name: name.into(), status: CheckStatus::Pass, error: None }
    }

    pub fn fail(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self { name: name.into(), status: CheckStatus::Fail, error: Some(error.into()) }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationRecord {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub script_name: String,
    pub subject_version: String,
    pub checks_passed: u32,
    pub checks_failed: u32,
    pub exit_code: i32,
    pub check_details: Vec<CheckDetail>,
}

impl ValidationRecord {
    /// Counts are always derived from `check_details`.
    pub fn new(script_name: impl Into<String>, subject_version: impl Into<String>, exit_code: i32, check_details: Vec<CheckDetail>) -> Self {
        let checks_passed = check_details.iter().filter(|c| c.status == CheckStatus::Pass).count() as u32;
        let checks_failed = check_details.iter().filter(|c| c.status == CheckStatus::Fail).count() as u32;
        Self {
            header: RecordHeader::now(RecordKind::Validation),
            script_name: script_name.into(),
            subject_version: subject_version.into(),
            checks_passed,
            checks_failed,
            exit_code,
            check_details,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.checks_failed == 0
    }

    pub fn failing_checks(&self) -> impl Iterator<Item = &CheckDetail> {
        self.check_details.iter().filter(|c| c.status == CheckStatus::Fail)
    }
}

impl LogRecord for ValidationRecord {
    const KIND: RecordKind = RecordKind::Validation;

    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn subject_version(&self) -> Option<&str> {
        Some(&self.subject_version)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GateRecord {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub gate_id: GateId,
    pub attempt_id: AttemptId,
    pub subject_version: String,
    pub status: GateStatus,
    pub checks_total: u32,
    pub checks_passed: u32,
    pub checks_failed: u32,
    pub validation_count: u32,
    pub operator: String,
    pub prior_gate_id: Option<GateId>,
}

impl GateRecord {
    pub fn passed(&self) -> bool {
        self.status == GateStatus::Pass
    }
}

impl LogRecord for GateRecord {
    const KIND: RecordKind = RecordKind::Gate;

    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn subject_version(&self) -> Option<&str> {
        Some(&self.subject_version)
    }
}

/// Opaque per-target state as reported by a probe.
pub type TargetState = BTreeMap<String, serde_json::Value>;

/// What a probe saw. An unreachable target is `Unknown`, never an empty state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetObservation {
    Observed { state: TargetState },
    Unknown { reason: String },
}

impl TargetObservation {
    pub fn state(&self) -> Option<&TargetState> {
        match self {
            TargetObservation::Observed { state } => Some(state),
            TargetObservation::Unknown { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReleaseSnapshot {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub subject_version: String,
    pub phase: Phase,
    pub targets: BTreeMap<TargetId, TargetObservation>,
}

impl ReleaseSnapshot {
    pub fn new(subject_version: impl Into<String>, phase: Phase, targets: BTreeMap<TargetId, TargetObservation>) -> Self {
        Self {
            header: RecordHeader::now(RecordKind::Snapshot),
            subject_version: subject_version.into(),
            phase,
            targets,
        }
    }
}

impl LogRecord for ReleaseSnapshot {
    const KIND: RecordKind = RecordKind::Snapshot;

    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn subject_version(&self) -> Option<&str> {
        Some(&self.subject_version)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PropagationTarget {
    pub target_id: TargetId,
    pub expected_changes: Vec<String>,
    pub actual_changes: Vec<String>,
    pub missing: Vec<String>,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PropagationAuditRecord {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub subject_version: String,
    pub source: String,
    pub targets: Vec<PropagationTarget>,
    pub all_complete: bool,
}

impl PropagationAuditRecord {
    /// `all_complete` is true iff every target is complete. An audit over
    /// zero targets proves nothing and is never complete.
    pub fn new(subject_version: impl Into<String>, source: impl Into<String>, targets: Vec<PropagationTarget>) -> Self {
        let all_complete = !targets.is_empty() && targets.iter().all(|t| t.complete);
        Self {
            header: RecordHeader::now(RecordKind::Propagation),
            subject_version: subject_version.into(),
            source: source.into(),
            targets,
            all_complete,
        }
    }

    pub fn incomplete(&self) -> impl Iterator<Item = &PropagationTarget> {
        self.targets.iter().filter(|t| !t.complete)
    }

    /// One line per incomplete target, naming what is missing.
    pub fn describe_incomplete(&self) -> Vec<String> {
        self.incomplete()
            .map(|t| match &t.error {
                Some(err) => format!("{} missing {:?} ({})", t.target_id, t.missing, err),
                None => format!("{} missing {:?}", t.target_id, t.missing),
            })
            .collect()
    }
}

impl LogRecord for PropagationAuditRecord {
    const KIND: RecordKind = RecordKind::Propagation;

    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn subject_version(&self) -> Option<&str> {
        Some(&self.subject_version)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(default)]
    pub details: String,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthSummary {
    pub ok: u32,
    pub warn: u32,
    pub critical: u32,
}

impl HealthSummary {
    pub fn from_checks(checks: &[HealthCheck]) -> Self {
        let mut s = Self::default();
        for c in checks {
            match c.status {
                HealthStatus::Ok => s.ok += 1,
                HealthStatus::Warn => s.warn += 1,
                HealthStatus::Critical => s.critical += 1,
            }
        }
        s
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthRecord {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub session_id: SessionId,
    pub checks: Vec<HealthCheck>,
    pub summary: HealthSummary,
}

impl HealthRecord {
    pub fn new(session_id: SessionId, checks: Vec<HealthCheck>) -> Self {
        let summary = HealthSummary::from_checks(&checks);
        Self { header: RecordHeader::now(RecordKind::Health), session_id, checks, summary }
    }
}

impl LogRecord for HealthRecord {
    const KIND: RecordKind = RecordKind::Health;

    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn subject_version(&self) -> Option<&str> {
        None
    }
}
