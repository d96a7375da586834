use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::TargetId;
use crate::records::{ReleaseSnapshot, TargetObservation};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UnknownTarget {
    pub target: TargetId,
    pub reason: String,
}

/// Structural comparison of the pre- and post-release snapshots of one version.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SnapshotDiff {
    pub subject_version: String,
    pub changed_targets: Vec<TargetId>,
    pub unchanged_targets: Vec<TargetId>,
    /// Expected to change but did not. These are release gaps.
    pub unexpected_unchanged: Vec<TargetId>,
    /// Probe failed on either side, or the target is absent from one snapshot.
    pub unknown_targets: Vec<UnknownTarget>,
    pub field_changes: BTreeMap<TargetId, Vec<FieldChange>>,
}

impl SnapshotDiff {
    pub fn has_gaps(&self, expected: &[TargetId]) -> bool {
        !self.unexpected_unchanged.is_empty() || self.unknown_targets.iter().any(|u| expected.contains(&u.target))
    }
}

/// Compare two snapshots field by field. `expected` names the targets the
/// release should have changed.
pub fn compute_diff(pre: &ReleaseSnapshot, post: &ReleaseSnapshot, expected: &[TargetId]) -> SnapshotDiff {
    let mut diff = SnapshotDiff { subject_version: post.subject_version.clone(), ..Default::default() };

    let ids: BTreeSet<&TargetId> = pre.targets.keys().chain(post.targets.keys()).chain(expected.iter()).collect();

    for id in ids {
        let before = pre.targets.get(id);
        let after = post.targets.get(id);
        let (b, a) = match (before, after) {
            (Some(TargetObservation::Observed { state: b }), Some(TargetObservation::Observed { state: a })) => (b, a),
            _ => {
                diff.unknown_targets.push(UnknownTarget { target: id.clone(), reason: unknown_reason(before, after) });
                continue;
            }
        };

        let fields: BTreeSet<&String> = b.keys().chain(a.keys()).collect();
        let changes: Vec<FieldChange> = fields
            .into_iter()
            .filter_map(|f| {
                let old = b.get(f);
                let new = a.get(f);
                (old != new).then(|| FieldChange { field: f.clone(), before: old.cloned(), after: new.cloned() })
            })
            .collect();

        if changes.is_empty() {
            diff.unchanged_targets.push(id.clone());
            if expected.contains(id) {
                diff.unexpected_unchanged.push(id.clone());
            }
        } else {
            diff.changed_targets.push(id.clone());
            diff.field_changes.insert(id.clone(), changes);
        }
    }

    diff
}

fn unknown_reason(before: Option<&TargetObservation>, after: Option<&TargetObservation>) -> String {
    let side = |label: &str, obs: Option<&TargetObservation>| match obs {
        None => Some(format!("{label}: not captured")),
        Some(TargetObservation::Unknown { reason }) => Some(format!("{label}: {reason}")),
        Some(TargetObservation::Observed { .. }) => None,
    };
    [side("pre-release", before), side("post-release", after)]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("; ")
}
