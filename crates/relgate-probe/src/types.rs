use std::path::PathBuf;

use relgate_core::{ProbeError, TargetId, TargetObservation, TargetState};
use serde::{Deserialize, Serialize};

/// A deployment target and how to observe it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TargetSpec {
    pub id: TargetId,
    #[serde(flatten)]
    pub source: TargetSource,
    /// Whether a release is expected to change this target.
    #[serde(default)]
    pub expect_change: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSource {
    /// A checkout on disk.
    Fs {
        root: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version_file: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        changelog: Option<String>,
        /// Relative path; `{version}` is replaced with the subject version.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        release_marker: Option<String>,
        /// Files fingerprinted with SHA-256, keyed by the path as written.
        #[serde(default)]
        watch: Vec<String>,
    },
    /// An external script printing a JSON object of state fields.
    Command {
        command: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dir: Option<PathBuf>,
    },
}

#[derive(Clone, Debug)]
pub struct ProbeContext {
    pub subject_version: String,
}

/// Answers "what is this target's current state". Supplied by the
/// surrounding release tooling; the engine never interprets the fields.
pub trait StateProbe: Send + Sync {
    fn probe(&self, target: &TargetSpec, ctx: &ProbeContext) -> Result<TargetState, ProbeError>;
}

/// Probe a target, turning any failure into an `Unknown` observation.
pub fn observe(probe: &dyn StateProbe, target: &TargetSpec, ctx: &ProbeContext) -> TargetObservation {
    match probe.probe(target, ctx) {
        Ok(state) => TargetObservation::Observed { state },
        Err(err) => {
            tracing::warn!(target_id = %target.id, error = %err, "probe failed; recording target as unknown");
            TargetObservation::Unknown { reason: err.to_string() }
        }
    }
}

/// Dispatches on the target's source kind.
#[derive(Clone, Debug, Default)]
pub struct ProbeSet {
    pub fs: crate::FsProbe,
    pub command: crate::CommandProbe,
}

impl ProbeSet {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { fs: crate::FsProbe::new(base_dir.clone()), command: crate::CommandProbe::new(base_dir) }
    }
}

impl StateProbe for ProbeSet {
    fn probe(&self, target: &TargetSpec, ctx: &ProbeContext) -> Result<TargetState, ProbeError> {
        match target.source {
            TargetSource::Fs { .. } => self.fs.probe(target, ctx),
            TargetSource::Command { .. } => self.command.probe(target, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Down;

    impl StateProbe for Down {
        fn probe(&self, target: &TargetSpec, _ctx: &ProbeContext) -> Result<TargetState, ProbeError> {
            Err(ProbeError::Unreachable { target: target.id.to_string(), reason: "connection refused".into() })
        }
    }

    #[test]
    fn failed_probe_becomes_unknown_with_reason() {
        let target = TargetSpec {
            id: TargetId::new("mirror"),
            source: TargetSource::Command { command: vec!["probe".into()], dir: None },
            expect_change: true,
        };
        let obs = observe(&Down, &target, &ProbeContext { subject_version: "3.6.0".into() });
        match obs {
            TargetObservation::Unknown { reason } => assert!(reason.contains("connection refused")),
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn target_spec_reads_from_json_with_kind_tag() {
        let spec: TargetSpec = serde_json::from_value(serde_json::json!({
            "id": "core",
            "kind": "fs",
            "root": "../core",
            "watch": ["CHANGELOG.md"],
            "expect_change": true
        }))
        .unwrap();
        assert_eq!(spec.id, TargetId::new("core"));
        assert!(spec.expect_change);
        assert!(matches!(spec.source, TargetSource::Fs { ref watch, .. } if watch == &vec!["CHANGELOG.md".to_string()]));
    }
}
