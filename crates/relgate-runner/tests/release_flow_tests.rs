#![cfg(unix)]

use std::path::{Path, PathBuf};

use relgate_core::{
    BlockReason, ExpectedChange, GateError, GateId, GateState, GateStatus, Phase, RecordKind, TargetId,
};
use relgate_probe::{TargetSource, TargetSpec};
use relgate_runner::{ChangeSet, CheckConfig, Config, GateConfig, Runner};
use relgate_storage::LogStoreExt;
use relgate_storage_jsonl::partition_path;
use serde_json::json;
use tempfile::{tempdir, TempDir};

fn sh(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

fn fs_target(id: &str) -> TargetSpec {
    TargetSpec {
        id: TargetId::new(id),
        source: TargetSource::Fs {
            root: PathBuf::from(id),
            version_file: Some("VERSION".into()),
            changelog: Some("CHANGELOG.md".into()),
            release_marker: None,
            watch: vec!["CHANGELOG.md".into()],
        },
        expect_change: true,
    }
}

fn write_target(root: &Path, id: &str, version: &str) {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("VERSION"), format!("{version}\n")).unwrap();
    std::fs::write(dir.join("CHANGELOG.md"), format!("# Changelog\n\n## [{version}]\n- release {version}\n")).unwrap();
}

/// G7.0 passes once `fixed` exists in the repo root; G7.2 needs a complete audit.
fn setup() -> (TempDir, Runner) {
    let dir = tempdir().unwrap();
    let gate = |id: &str, script: &str, requires_propagation: bool| GateConfig {
        id: GateId::new(id),
        requires_propagation,
        checks: vec![CheckConfig { name: format!("{id}_checks"), command: sh(script) }],
    };
    let mut cfg = Config::default_for_repo("framework");
    cfg.gates.order = ["G7.0", "G7.1", "G7.2"].map(GateId::new).to_vec();
    cfg.gates.gates = vec![
        gate("G7.0", "test -f fixed", false),
        gate("G7.1", "true", false),
        gate("G7.2", "true", true),
    ];
    cfg.targets = vec![fs_target("core"), fs_target("mirror")];
    cfg.save_to(&Config::config_path(dir.path())).unwrap();

    write_target(dir.path(), "core", "3.5.0");
    write_target(dir.path(), "mirror", "3.5.0");

    let runner = Runner::open(dir.path().to_path_buf()).unwrap();
    runner.doctor().unwrap();
    (dir, runner)
}

fn gate_error(err: anyhow::Error) -> GateError {
    match err.downcast::<GateError>() {
        Ok(e) => e,
        Err(other) => panic!("expected a gate error, got {other:#}"),
    }
}

#[test]
fn successor_gate_is_blocked_naming_the_prior_gate() {
    let (_dir, runner) = setup();
    let err = gate_error(runner.run_gate(&GateId::new("G7.1"), "3.6.0", "op").unwrap_err());
    assert!(err.is_blocking());
    match err {
        GateError::Blocked { prior, reason, .. } => {
            assert_eq!(prior, GateId::new("G7.0"));
            assert_eq!(reason, BlockReason::PriorMissing);
        }
        other => panic!("unexpected {other}"),
    }
    assert_eq!(runner.store.count(RecordKind::Gate).unwrap(), 0);
}

#[test]
fn failed_gate_retries_and_then_unblocks_successor() {
    let (dir, runner) = setup();
    let g0 = GateId::new("G7.0");
    let g1 = GateId::new("G7.1");

    let first = runner.run_gate(&g0, "3.6.0", "op").unwrap();
    assert_eq!(first.status, GateStatus::Fail);
    let err = gate_error(runner.run_gate(&g1, "3.6.0", "op").unwrap_err());
    assert!(matches!(err, GateError::Blocked { reason: BlockReason::PriorFailed, .. }));

    std::fs::write(dir.path().join("fixed"), "").unwrap();
    let retry = runner.run_gate(&g0, "3.6.0", "op").unwrap();
    assert_eq!(retry.status, GateStatus::Pass);
    assert_ne!(first.attempt_id, retry.attempt_id);

    let next = runner.run_gate(&g1, "3.6.0", "op").unwrap();
    assert!(next.passed());
    assert_eq!(runner.store.count(RecordKind::Gate).unwrap(), 3);

    let report = runner.gate_report("3.6.0").unwrap();
    let states: Vec<GateState> = report.iter().map(|e| e.state).collect();
    assert_eq!(states, vec![GateState::Passed, GateState::Passed, GateState::NotAttempted]);
}

#[test]
fn post_release_failure_is_queryable_by_version() {
    let (_dir, runner) = setup();
    let mut script = String::new();
    for i in 1..=11 {
        script.push_str(&format!("echo '{{\"name\":\"check_{i}\",\"status\":\"pass\"}}'; "));
    }
    script.push_str("echo '{\"name\":\"mirror_changelog\",\"status\":\"fail\",\"error\":\"stale\"}'; exit 1");

    let (rec, run) = runner.run_validation("post_release_validation", "3.6.0", &sh(&script)).unwrap();
    assert_eq!((rec.checks_passed, rec.checks_failed, rec.exit_code), (11, 1, 1));
    assert!(run.stdout.contains("mirror_changelog"));

    let failures = runner.history().failures_for_version("3.6.0").unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].script_name, "post_release_validation");
    assert_eq!(failures[0].check, "mirror_changelog");
    assert!(runner.history().failures_for_version("3.5.0").unwrap().is_empty());
}

#[test]
fn missing_validator_is_recorded_with_invocation_exit_code() {
    let (_dir, runner) = setup();
    let (rec, _) = runner.run_validation("lint", "3.6.0", &["/no/such/validator".to_string()]).unwrap();
    assert_eq!(rec.exit_code, 127);
    assert_eq!(runner.store.count(RecordKind::Validation).unwrap(), 1);
}

#[test]
fn diff_and_audit_gate_the_propagation_sensitive_gate() {
    let (dir, runner) = setup();
    std::fs::write(dir.path().join("fixed"), "").unwrap();
    runner.run_gate(&GateId::new("G7.0"), "3.6.0", "op").unwrap();
    runner.run_gate(&GateId::new("G7.1"), "3.6.0", "op").unwrap();

    runner.snapshot("3.6.0", Phase::PreRelease, &[]).unwrap();
    write_target(dir.path(), "core", "3.6.0");
    runner.snapshot("3.6.0", Phase::PostRelease, &[]).unwrap();

    let (diff, expected) = runner.diff("3.6.0", None).unwrap();
    assert_eq!(diff.changed_targets, vec![TargetId::new("core")]);
    assert_eq!(diff.unexpected_unchanged, vec![TargetId::new("mirror")]);
    assert!(diff.has_gaps(&expected));

    let changes = ChangeSet {
        source: Some("framework@3.6.0".into()),
        changes: vec![ExpectedChange::changed("CHANGELOG.md"), ExpectedChange::equals("version_marker", json!("3.6.0"))],
        targets: vec![],
    };
    let g2 = GateId::new("G7.2");

    let err = gate_error(runner.run_gate(&g2, "3.6.0", "op").unwrap_err());
    assert!(matches!(err, GateError::PropagationUnaudited { .. }));

    let audit = runner.audit("3.6.0", &changes, None, &[]).unwrap();
    assert!(!audit.all_complete);
    let mirror = audit.targets.iter().find(|t| t.target_id == TargetId::new("mirror")).unwrap();
    assert_eq!(mirror.missing, vec!["CHANGELOG.md".to_string(), "version_marker".to_string()]);
    let err = gate_error(runner.run_gate(&g2, "3.6.0", "op").unwrap_err());
    assert!(matches!(err, GateError::PropagationIncomplete { .. }));
    assert!(err.to_string().contains("mirror"));

    write_target(dir.path(), "mirror", "3.6.0");
    let audit = runner.audit("3.6.0", &changes, None, &[]).unwrap();
    assert!(audit.all_complete);
    assert_eq!(audit.source, "framework@3.6.0");
    assert!(runner.run_gate(&g2, "3.6.0", "op").unwrap().passed());
}

#[test]
fn unreachable_target_is_unknown_in_diff() {
    let (dir, runner) = setup();
    runner.snapshot("3.6.0", Phase::PreRelease, &[]).unwrap();
    std::fs::remove_dir_all(dir.path().join("mirror")).unwrap();
    runner.snapshot("3.6.0", Phase::PostRelease, &[]).unwrap();

    let (diff, _) = runner.diff("3.6.0", Some(vec![])).unwrap();
    assert_eq!(diff.unknown_targets.len(), 1);
    assert_eq!(diff.unknown_targets[0].target, TargetId::new("mirror"));
    assert!(!diff.unchanged_targets.contains(&TargetId::new("mirror")));
}

#[test]
fn gate_history_survives_restart_and_torn_tail() {
    let (dir, runner) = setup();
    std::fs::write(dir.path().join("fixed"), "").unwrap();
    runner.run_gate(&GateId::new("G7.0"), "3.6.0", "op").unwrap();
    let logs = runner.cfg.logs_dir(dir.path());
    drop(runner);

    // a crash mid-append leaves a partial line behind
    let gate_log = partition_path(&logs, RecordKind::Gate);
    let mut bytes = std::fs::read(&gate_log).unwrap();
    bytes.extend_from_slice(br#"{"timestamp":"2026-10-16T00:00:00Z","record_kind":"gate","gate_id":"G7.1"#);
    std::fs::write(&gate_log, bytes).unwrap();

    let runner = Runner::open(dir.path().to_path_buf()).unwrap();
    runner.doctor().unwrap();
    let seq = runner.sequencer();
    assert_eq!(seq.gate_state(&GateId::new("G7.0"), "3.6.0").unwrap(), GateState::Passed);
    assert_eq!(seq.gate_state(&GateId::new("G7.1"), "3.6.0").unwrap(), GateState::NotAttempted);
    assert!(runner.run_gate(&GateId::new("G7.1"), "3.6.0", "op").unwrap().passed());
    assert_eq!(runner.store.count(RecordKind::Gate).unwrap(), 2);
}

#[test]
fn audit_without_expected_changes_keeps_the_gate_blocked() {
    let (dir, runner) = setup();
    std::fs::write(dir.path().join("fixed"), "").unwrap();
    runner.run_gate(&GateId::new("G7.0"), "3.6.0", "op").unwrap();
    runner.run_gate(&GateId::new("G7.1"), "3.6.0", "op").unwrap();
    runner.snapshot("3.6.0", Phase::PreRelease, &[]).unwrap();

    let empty = ChangeSet { source: None, changes: vec![], targets: vec![] };
    let audit = runner.audit("3.6.0", &empty, None, &[]).unwrap();
    assert!(!audit.all_complete);
    assert!(audit.targets.iter().all(|t| !t.complete));

    let err = gate_error(runner.run_gate(&GateId::new("G7.2"), "3.6.0", "op").unwrap_err());
    assert!(matches!(err, GateError::PropagationIncomplete { .. }));
    assert_eq!(runner.store.count(RecordKind::Gate).unwrap(), 2);
}
