use crate::error::BlockReason;
use crate::ids::GateId;
use crate::model::{GateState, GateStatus};
use crate::records::{GateRecord, ValidationRecord};

/// Decision for a gate attempt, taken purely from the prior gate's latest record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Proceed { prior: Option<GateId> },
    Blocked { prior: GateId, reason: BlockReason },
}

impl Admission {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Admission::Blocked { .. })
    }
}

/// `prior_latest` must be the latest record for `(prior, subject_version)`.
pub fn admit(prior: Option<&GateId>, prior_latest: Option<&GateRecord>) -> Admission {
    let Some(prior) = prior else {
        return Admission::Proceed { prior: None };
    };
    match prior_latest {
        None => Admission::Blocked { prior: prior.clone(), reason: BlockReason::PriorMissing },
        Some(rec) if !rec.passed() => Admission::Blocked { prior: prior.clone(), reason: BlockReason::PriorFailed },
        Some(_) => Admission::Proceed { prior: Some(prior.clone()) },
    }
}

/// Current state of a gate as seen from history. The gate's own latest record
/// wins; without one, the admission decides between blocked and not attempted.
pub fn derive_gate_state(own_latest: Option<&GateRecord>, admission: &Admission) -> GateState {
    match own_latest {
        Some(rec) if rec.passed() => GateState::Passed,
        Some(_) => GateState::Failed,
        None if admission.is_blocked() => GateState::Blocked,
        None => GateState::NotAttempted,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GateTally {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
}

/// Aggregate the validation work run under one gate attempt.
///
/// A validation unit with no structured details counts as a single check
/// decided by its exit code. The gate passes iff every unit exited 0 and no
/// check failed.
pub fn tally_gate(validations: &[ValidationRecord]) -> (GateStatus, GateTally) {
    let mut tally = GateTally::default();
    let mut all_ok = true;
    for v in validations {
        if v.check_details.is_empty() {
            tally.total += 1;
            if v.exit_code == 0 {
                tally.passed += 1;
            } else {
                tally.failed += 1;
            }
        } else {
            tally.total += v.check_details.len() as u32;
            tally.passed += v.checks_passed;
            tally.failed += v.checks_failed;
        }
        all_ok &= v.succeeded();
    }
    let status = if all_ok && tally.failed == 0 { GateStatus::Pass } else { GateStatus::Fail };
    (status, tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::AttemptId;
    use crate::model::RecordKind;
    use crate::records::{CheckDetail, RecordHeader};

    fn gate_rec(id: &str, status: GateStatus) -> GateRecord {
        GateRecord {
            header: RecordHeader::now(RecordKind::Gate),
            gate_id: GateId::new(id),
            attempt_id: AttemptId::random(),
            subject_version: "3.6.0".into(),
            status,
            checks_total: 0,
            checks_passed: 0,
            checks_failed: 0,
            validation_count: 0,
            operator: "op".into(),
            prior_gate_id: None,
        }
    }

    #[test]
    fn first_gate_always_proceeds() {
        assert_eq!(admit(None, None), Admission::Proceed { prior: None });
    }

    #[test]
    fn missing_or_failed_prior_blocks() {
        let prior = GateId::new("G7.0");
        assert_eq!(
            admit(Some(&prior), None),
            Admission::Blocked { prior: prior.clone(), reason: BlockReason::PriorMissing }
        );
        let failed = gate_rec("G7.0", GateStatus::Fail);
        assert_eq!(
            admit(Some(&prior), Some(&failed)),
            Admission::Blocked { prior: prior.clone(), reason: BlockReason::PriorFailed }
        );
        let passed = gate_rec("G7.0", GateStatus::Pass);
        assert_eq!(admit(Some(&prior), Some(&passed)), Admission::Proceed { prior: Some(prior) });
    }

    #[test]
    fn own_record_wins_over_admission() {
        let blocked = Admission::Blocked { prior: GateId::new("G7.0"), reason: BlockReason::PriorFailed };
        let own = gate_rec("G7.1", GateStatus::Pass);
        assert_eq!(derive_gate_state(Some(&own), &blocked), GateState::Passed);
        assert_eq!(derive_gate_state(None, &blocked), GateState::Blocked);
        assert_eq!(derive_gate_state(None, &Admission::Proceed { prior: None }), GateState::NotAttempted);
    }

    #[test]
    fn tally_counts_details_and_bare_exit_codes() {
        let detailed = ValidationRecord::new(
            "post_release_validation",
            "3.6.0",
            1,
            vec![CheckDetail::pass("a"), CheckDetail::fail("b", "boom")],
        );
        let bare_ok = ValidationRecord::new("lint", "3.6.0", 0, vec![]);
        let (status, tally) = tally_gate(&[detailed, bare_ok]);
        assert_eq!(status, GateStatus::Fail);
        assert_eq!(tally, GateTally { total: 3, passed: 2, failed: 1 });
    }

    #[test]
    fn nonzero_exit_fails_gate_even_with_passing_details() {
        let v = ValidationRecord::new("s", "3.6.0", 2, vec![CheckDetail::pass("a")]);
        let (status, _) = tally_gate(&[v]);
        assert_eq!(status, GateStatus::Fail);
    }

    #[test]
    fn no_work_passes() {
        let (status, tally) = tally_gate(&[]);
        assert_eq!(status, GateStatus::Pass);
        assert_eq!(tally, GateTally::default());
    }
}
