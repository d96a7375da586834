use std::path::Path;

use anyhow::{bail, Context, Result};
use relgate_core::{
    evaluate_target, ExpectedChange, GateError, GateId, Phase, PropagationAuditRecord, StoreError, TargetId,
};
use relgate_probe::{StateProbe, TargetSpec};
use relgate_storage::{LogStore, LogStoreExt};
use serde::{Deserialize, Serialize};

use crate::snapshot::SnapshotEngine;

/// A source-of-truth change set, read from YAML:
///
/// ```yaml
/// source: framework@3.6.0
/// changes:
///   - artifact: CHANGELOG.md
///   - artifact: version_marker
///     value: "3.6.0"
/// targets: [core, registry]
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ChangeSet {
    #[serde(default)]
    pub source: Option<String>,
    pub changes: Vec<ExpectedChange>,
    /// Empty means every configured target.
    #[serde(default)]
    pub targets: Vec<TargetId>,
}

impl ChangeSet {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cs: ChangeSet = serde_yaml::from_str(&s).with_context(|| format!("parse change set {}", path.display()))?;
        if cs.changes.is_empty() {
            bail!("change set {} names no expected changes", path.display());
        }
        Ok(cs)
    }
}

pub struct PropagationAuditor<'a> {
    store: &'a dyn LogStore,
    probe: &'a dyn StateProbe,
}

impl<'a> PropagationAuditor<'a> {
    pub fn new(store: &'a dyn LogStore, probe: &'a dyn StateProbe) -> Self {
        Self { store, probe }
    }

    /// Probe every target, compare against `expected`, and append the audit.
    ///
    /// Changes without a literal value are judged against the latest
    /// pre-release snapshot of the version.
    pub fn audit(
        &self,
        subject_version: &str,
        source: &str,
        expected: &[ExpectedChange],
        targets: &[TargetSpec],
    ) -> Result<PropagationAuditRecord, StoreError> {
        let snapshots = SnapshotEngine::new(self.store, self.probe);
        let baseline = snapshots.latest(subject_version, Phase::PreRelease)?;
        let current = snapshots.observe_all(subject_version, targets);

        let results = current
            .iter()
            .map(|(id, obs)| evaluate_target(id, expected, obs, baseline.as_ref().and_then(|b| b.targets.get(id))))
            .collect();
        let rec = PropagationAuditRecord::new(subject_version, source, results);
        let seq = self.store.append(&rec)?;

        if rec.all_complete {
            tracing::info!(version = subject_version, targets = rec.targets.len(), seq, "propagation complete");
        } else {
            for line in rec.describe_incomplete() {
                tracing::warn!(version = subject_version, seq, "propagation incomplete: {line}");
            }
        }
        Ok(rec)
    }

    pub fn require_complete(&self, gate: &GateId, subject_version: &str) -> Result<PropagationAuditRecord, GateError> {
        require_propagation_complete(self.store, gate, subject_version)
    }
}

/// The downstream contract: `gate` may only proceed when the latest audit
/// for the version exists and is complete.
pub fn require_propagation_complete(
    store: &dyn LogStore,
    gate: &GateId,
    subject_version: &str,
) -> Result<PropagationAuditRecord, GateError> {
    let latest = store.read_latest(|r: &PropagationAuditRecord| r.subject_version == subject_version)?;
    match latest {
        None => Err(GateError::PropagationUnaudited { gate: gate.clone(), version: subject_version.to_string() }),
        Some(rec) if !rec.all_complete => Err(GateError::PropagationIncomplete {
            gate: gate.clone(),
            version: subject_version.to_string(),
            incomplete: if rec.targets.is_empty() {
                vec!["audit covered no targets".to_string()]
            } else {
                rec.describe_incomplete()
            },
        }),
        Some(rec) => Ok(rec),
    }
}
