use std::fmt;

use serde::{Deserialize, Serialize};

/// Partition a record lives in. One append-only log per kind.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Validation,
    Gate,
    Snapshot,
    Propagation,
    Health,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Validation,
        RecordKind::Gate,
        RecordKind::Snapshot,
        RecordKind::Propagation,
        RecordKind::Health,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Validation => "validation",
            RecordKind::Gate => "gate",
            RecordKind::Snapshot => "snapshot",
            RecordKind::Propagation => "propagation",
            RecordKind::Health => "health",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pass,
    Fail,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skip,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Warn,
    Critical,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Phase {
    #[serde(rename = "pre-release")]
    PreRelease,
    #[serde(rename = "post-release")]
    PostRelease,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreRelease => "pre-release",
            Phase::PostRelease => "post-release",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate lifecycle. Only `Passed`/`Failed` are ever persisted; the rest are
/// derived from history or exist for the duration of one attempt.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    NotAttempted,
    Blocked,
    InProgress,
    Passed,
    Failed,
}

impl GateState {
    pub fn can_transition_to(&self, next: GateState) -> bool {
        use GateState::*;
        matches!(
            (self, next),
            (NotAttempted, Blocked)
                | (NotAttempted, InProgress)
                | (Blocked, Blocked)
                | (Blocked, InProgress)
                | (InProgress, Passed)
                | (InProgress, Failed)
                | (Failed, InProgress)
                | (Failed, Blocked)
                | (Passed, InProgress)
                | (Passed, Blocked)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::NotAttempted => "not_attempted",
            GateState::Blocked => "blocked",
            GateState::InProgress => "in_progress",
            GateState::Passed => "passed",
            GateState::Failed => "failed",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
