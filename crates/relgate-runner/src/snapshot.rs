use std::collections::BTreeMap;

use relgate_core::{
    compute_diff, Phase, ReleaseSnapshot, SnapshotDiff, SnapshotError, StoreError, TargetId, TargetObservation,
};
use relgate_probe::{observe, ProbeContext, StateProbe, TargetSpec};
use relgate_storage::{LogStore, LogStoreExt};

/// Captures target state at the edges of a release window and compares it.
pub struct SnapshotEngine<'a> {
    store: &'a dyn LogStore,
    probe: &'a dyn StateProbe,
}

impl<'a> SnapshotEngine<'a> {
    pub fn new(store: &'a dyn LogStore, probe: &'a dyn StateProbe) -> Self {
        Self { store, probe }
    }

    /// Probe every target now. Failed probes come back as `Unknown`.
    pub fn observe_all(&self, subject_version: &str, targets: &[TargetSpec]) -> BTreeMap<TargetId, TargetObservation> {
        let ctx = ProbeContext { subject_version: subject_version.to_string() };
        targets.iter().map(|t| (t.id.clone(), observe(self.probe, t, &ctx))).collect()
    }

    pub fn capture(&self, subject_version: &str, phase: Phase, targets: &[TargetSpec]) -> Result<ReleaseSnapshot, StoreError> {
        let snap = ReleaseSnapshot::new(subject_version, phase, self.observe_all(subject_version, targets));
        let seq = self.store.append(&snap)?;
        let unknown = snap.targets.values().filter(|o| o.state().is_none()).count();
        tracing::info!(version = subject_version, %phase, targets = snap.targets.len(), unknown, seq, "snapshot captured");
        Ok(snap)
    }

    /// A re-capture supersedes earlier snapshots for the same version and phase.
    pub fn latest(&self, subject_version: &str, phase: Phase) -> Result<Option<ReleaseSnapshot>, StoreError> {
        self.store.read_latest(|s: &ReleaseSnapshot| s.subject_version == subject_version && s.phase == phase)
    }

    fn require(&self, subject_version: &str, phase: Phase) -> Result<ReleaseSnapshot, SnapshotError> {
        self.latest(subject_version, phase)?
            .ok_or_else(|| SnapshotError::Missing { version: subject_version.to_string(), phase })
    }

    pub fn diff(&self, subject_version: &str, expected: &[TargetId]) -> Result<SnapshotDiff, SnapshotError> {
        let pre = self.require(subject_version, Phase::PreRelease)?;
        let post = self.require(subject_version, Phase::PostRelease)?;
        let diff = compute_diff(&pre, &post, expected);
        if diff.has_gaps(expected) {
            tracing::warn!(
                version = subject_version,
                unexpected_unchanged = diff.unexpected_unchanged.len(),
                unknown = diff.unknown_targets.len(),
                "snapshot diff has gaps"
            );
        }
        Ok(diff)
    }
}
