use serde::{Deserialize, Serialize};

use crate::ids::TargetId;
use crate::records::{PropagationTarget, TargetObservation};

/// One artifact a change set must land on every target.
///
/// With `value`, the target's field must equal it. Without, the field must
/// differ from the target's pre-release baseline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExpectedChange {
    pub artifact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl ExpectedChange {
    pub fn changed(artifact: impl Into<String>) -> Self {
        Self { artifact: artifact.into(), value: None }
    }

    pub fn equals(artifact: impl Into<String>, value: serde_json::Value) -> Self {
        Self { artifact: artifact.into(), value: Some(value) }
    }
}

/// Decide whether one target received the expected changes. An empty
/// `expected` proves nothing, so the target is never complete.
pub fn evaluate_target(
    target_id: &TargetId,
    expected: &[ExpectedChange],
    current: &TargetObservation,
    baseline: Option<&TargetObservation>,
) -> PropagationTarget {
    let expected_changes: Vec<String> = expected.iter().map(|e| e.artifact.clone()).collect();
    if expected.is_empty() {
        return PropagationTarget {
            target_id: target_id.clone(),
            expected_changes,
            actual_changes: vec![],
            missing: vec![],
            complete: false,
            error: Some("change set names no expected changes".to_string()),
        };
    }

    let state = match current {
        TargetObservation::Observed { state } => state,
        TargetObservation::Unknown { reason } => {
            return PropagationTarget {
                target_id: target_id.clone(),
                missing: expected_changes.clone(),
                expected_changes,
                actual_changes: vec![],
                complete: false,
                error: Some(reason.clone()),
            };
        }
    };
    let base = baseline.and_then(TargetObservation::state);

    let mut actual_changes = Vec::new();
    if let Some(base) = base {
        for (field, now) in state {
            if base.get(field) != Some(now) {
                actual_changes.push(field.clone());
            }
        }
    }

    let mut missing = Vec::new();
    let mut needs_baseline = false;
    for exp in expected {
        let now = state.get(&exp.artifact);
        let landed = match (&exp.value, base) {
            (Some(want), _) => now == Some(want),
            (None, Some(base)) => now.is_some() && base.get(&exp.artifact) != now,
            (None, None) => {
                needs_baseline = true;
                false
            }
        };
        if landed {
            if !actual_changes.contains(&exp.artifact) {
                actual_changes.push(exp.artifact.clone());
            }
        } else {
            missing.push(exp.artifact.clone());
        }
    }

    PropagationTarget {
        target_id: target_id.clone(),
        expected_changes,
        actual_changes,
        complete: missing.is_empty(),
        missing,
        error: needs_baseline.then(|| "no pre-release baseline for target".to_string()),
    }
}
