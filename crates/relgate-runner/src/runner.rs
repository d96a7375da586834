use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use relgate_core::{
    GateId, GateOrder, GateRecord, HealthCheck, HealthRecord, Phase, PropagationAuditRecord, ReleaseSnapshot,
    SessionId, SnapshotDiff, TargetId, ValidationRecord,
};
use relgate_probe::{ProbeSet, TargetSpec};
use relgate_storage_jsonl::JsonlLogStore;

use crate::doctor::doctor;
use crate::propagation::{ChangeSet, PropagationAuditor};
use crate::queries::History;
use crate::recorder::{HealthRecorder, ValidationRecorder};
use crate::script::{run_script, ScriptCheck, ScriptRun};
use crate::sequencer::{GateCheck, GateReportEntry, GateSequencer};
use crate::snapshot::SnapshotEngine;
use crate::Config;

/// Everything a CLI invocation needs, opened from `<repo>/.relgate/`.
pub struct Runner {
    pub repo_root: PathBuf,
    pub cfg: Config,
    pub order: GateOrder,
    pub store: JsonlLogStore,
    pub probes: ProbeSet,
}

impl Runner {
    pub fn open(repo_root: PathBuf) -> Result<Self> {
        let cfg_path = Config::config_path(&repo_root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_repo(project_id(&repo_root));
            cfg.save_to(&cfg_path)?;
            cfg
        };
        cfg.validate().with_context(|| format!("invalid {}", cfg_path.display()))?;

        let logs = cfg.logs_dir(&repo_root);
        let store = JsonlLogStore::open(&logs).with_context(|| format!("open logs at {}", logs.display()))?;
        let order = cfg.gate_order();
        let probes = ProbeSet::new(repo_root.clone());

        Ok(Self { repo_root, cfg, order, store, probes })
    }

    pub fn init_repo(repo_root: &Path) -> Result<()> {
        let cfg_path = Config::config_path(repo_root);
        if !cfg_path.exists() {
            Config::default_for_repo(project_id(repo_root)).save_to(&cfg_path)?;
        }
        let cfg = Config::load_from(&cfg_path)?;
        let _ = JsonlLogStore::open(&cfg.logs_dir(repo_root))?;
        Ok(())
    }

    pub fn doctor(&self) -> Result<()> {
        doctor(&self.repo_root, &self.cfg)
    }

    /// Run one validation script and record its outcome, whatever it was.
    pub fn run_validation(&self, script_name: &str, subject_version: &str, argv: &[String]) -> Result<(ValidationRecord, ScriptRun)> {
        let run = run_script(script_name, argv, &self.repo_root, subject_version);
        let rec = ValidationRecorder::new(&self.store).record(script_name, subject_version, run.outcome.clone())?;
        Ok((rec, run))
    }

    pub fn sequencer(&self) -> GateSequencer<'_> {
        GateSequencer::new(&self.store, &self.order).require_propagation(self.cfg.propagation_gates())
    }

    /// Gate errors pass through untouched so callers can tell blocking from fatal.
    pub fn run_gate(&self, gate: &GateId, subject_version: &str, operator: &str) -> Result<GateRecord> {
        let gate_cfg = self.cfg.gate(gate).ok_or_else(|| anyhow!("gate {gate} is not declared in relgate.toml"))?;
        let checks: Vec<ScriptCheck> = gate_cfg
            .checks
            .iter()
            .map(|c| ScriptCheck { name: c.name.clone(), argv: c.command.clone(), dir: self.repo_root.clone() })
            .collect();
        let checks: Vec<&dyn GateCheck> = checks.iter().map(|c| c as &dyn GateCheck).collect();
        Ok(self.sequencer().attempt_gate(gate, subject_version, operator, &checks)?)
    }

    pub fn gate_report(&self, subject_version: &str) -> Result<Vec<GateReportEntry>> {
        Ok(self.sequencer().gate_report(subject_version)?)
    }

    pub fn snapshot(&self, subject_version: &str, phase: Phase, targets: &[TargetId]) -> Result<ReleaseSnapshot> {
        let targets = self.cfg.select_targets(targets)?;
        Ok(SnapshotEngine::new(&self.store, &self.probes).capture(subject_version, phase, &targets)?)
    }

    /// `expected` defaults to the targets configured with `expect_change`.
    pub fn diff(&self, subject_version: &str, expected: Option<Vec<TargetId>>) -> Result<(SnapshotDiff, Vec<TargetId>)> {
        let expected = expected.unwrap_or_else(|| self.cfg.expected_targets());
        let diff = SnapshotEngine::new(&self.store, &self.probes).diff(subject_version, &expected)?;
        Ok((diff, expected))
    }

    /// Targets named on the command line win over those in the change set.
    pub fn audit(&self, subject_version: &str, changes: &ChangeSet, source: Option<&str>, targets: &[TargetId]) -> Result<PropagationAuditRecord> {
        let ids = if targets.is_empty() { changes.targets.as_slice() } else { targets };
        let targets: Vec<TargetSpec> = self.cfg.select_targets(ids)?;
        let source = source.or(changes.source.as_deref()).unwrap_or(&self.cfg.project.id);
        Ok(PropagationAuditor::new(&self.store, &self.probes).audit(subject_version, source, &changes.changes, &targets)?)
    }

    pub fn record_health(&self, session_id: Option<SessionId>, checks: Vec<HealthCheck>) -> Result<HealthRecord> {
        let session_id = session_id.unwrap_or_else(SessionId::random);
        Ok(HealthRecorder::new(&self.store).record(session_id, checks)?)
    }

    pub fn history(&self) -> History<'_> {
        History::new(&self.store)
    }
}

fn project_id(repo_root: &Path) -> &str {
    repo_root.file_name().and_then(|s| s.to_str()).unwrap_or("repo")
}
