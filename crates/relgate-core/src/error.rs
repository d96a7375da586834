use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::ids::GateId;
use crate::model::{GateState, Phase, RecordKind};

/// Storage failures are fatal: an operation that could not be durably
/// recorded did not happen.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("log store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize {kind} record: {source}")]
    Serialize {
        kind: RecordKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("corrupt {kind} record at line {line}: {source}")]
    Corrupt {
        kind: RecordKind,
        line: u64,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} log line {line} carries record_kind {found}")]
    KindMismatch { kind: RecordKind, line: u64, found: RecordKind },
    #[error("{kind} record contains a line break and cannot be framed")]
    Framing { kind: RecordKind },
    #[error("log store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockReason {
    PriorMissing,
    PriorFailed,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::PriorMissing => f.write_str("has no recorded attempt"),
            BlockReason::PriorFailed => f.write_str("has not passed (latest record is fail)"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("unknown gate {0}; not present in the configured gate order")]
    UnknownGate(GateId),
    #[error("gate {gate} blocked for {version}: prior gate {prior} {reason}")]
    Blocked { gate: GateId, version: String, prior: GateId, reason: BlockReason },
    #[error("gate {gate} blocked for {version}: propagation incomplete: {}", .incomplete.join("; "))]
    PropagationIncomplete { gate: GateId, version: String, incomplete: Vec<String> },
    #[error("gate {gate} blocked for {version}: no propagation audit recorded")]
    PropagationUnaudited { gate: GateId, version: String },
    #[error("invalid gate transition {from} -> {to}")]
    InvalidTransition { from: GateState, to: GateState },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GateError {
    /// Blocking errors are resolvable by the operator; everything else is fatal.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            GateError::Blocked { .. } | GateError::PropagationIncomplete { .. } | GateError::PropagationUnaudited { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("target {target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },
    #[error("probe io error for {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },
    #[error("probe command for {target} failed: {detail}")]
    Command { target: String, detail: String },
    #[error("probe output for {target} malformed: {detail}")]
    Malformed { target: String, detail: String },
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no {phase} snapshot recorded for {version}")]
    Missing { version: String, phase: Phase },
    #[error(transparent)]
    Store(#[from] StoreError),
}
