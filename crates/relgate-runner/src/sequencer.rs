use relgate_core::{
    admit, derive_gate_state, tally_gate, Admission, AttemptId, GateError, GateId, GateOrder, GateRecord, GateState,
    RecordHeader, RecordKind, StoreError,
};
use relgate_storage::{LogStore, LogStoreExt};
use serde::Serialize;

use crate::propagation::require_propagation_complete;
use crate::recorder::{ValidationOutcome, ValidationRecorder};
use crate::script::{run_script, ScriptCheck};

/// One unit of validation work run under a gate.
pub trait GateCheck {
    fn name(&self) -> &str;
    fn run(&self, subject_version: &str) -> ValidationOutcome;
}

impl GateCheck for ScriptCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, subject_version: &str) -> ValidationOutcome {
        run_script(&self.name, &self.argv, &self.dir, subject_version).outcome
    }
}

/// In-process check, mostly for embedding and tests.
pub struct FnCheck<F> {
    name: String,
    f: F,
}

impl<F: Fn(&str) -> ValidationOutcome> FnCheck<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F: Fn(&str) -> ValidationOutcome> GateCheck for FnCheck<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, subject_version: &str) -> ValidationOutcome {
        (self.f)(subject_version)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct GateReportEntry {
    pub gate_id: GateId,
    pub state: GateState,
    pub requires_propagation: bool,
    pub latest: Option<GateRecord>,
}

/// Enforces gate order from the gate log alone. Nothing about progress is
/// held in memory between calls.
pub struct GateSequencer<'a> {
    store: &'a dyn LogStore,
    order: &'a GateOrder,
    propagation_gates: Vec<GateId>,
}

impl<'a> GateSequencer<'a> {
    pub fn new(store: &'a dyn LogStore, order: &'a GateOrder) -> Self {
        Self { store, order, propagation_gates: vec![] }
    }

    /// Gates that additionally need a complete propagation audit for the version.
    pub fn require_propagation(mut self, gates: impl IntoIterator<Item = GateId>) -> Self {
        self.propagation_gates.extend(gates);
        self
    }

    pub fn latest(&self, gate: &GateId, subject_version: &str) -> Result<Option<GateRecord>, StoreError> {
        self.store.read_latest(|r: &GateRecord| &r.gate_id == gate && r.subject_version == subject_version)
    }

    pub fn admission(&self, gate: &GateId, subject_version: &str) -> Result<Admission, GateError> {
        let prior = self.order.prior(gate)?;
        let prior_latest = match prior {
            Some(p) => self.latest(p, subject_version)?,
            None => None,
        };
        Ok(admit(prior, prior_latest.as_ref()))
    }

    pub fn gate_state(&self, gate: &GateId, subject_version: &str) -> Result<GateState, GateError> {
        let admission = self.admission(gate, subject_version)?;
        let own = self.latest(gate, subject_version)?;
        Ok(derive_gate_state(own.as_ref(), &admission))
    }

    pub fn gate_report(&self, subject_version: &str) -> Result<Vec<GateReportEntry>, GateError> {
        self.order
            .gates()
            .iter()
            .map(|gate| {
                let admission = self.admission(gate, subject_version)?;
                let latest = self.latest(gate, subject_version)?;
                Ok(GateReportEntry {
                    gate_id: gate.clone(),
                    state: derive_gate_state(latest.as_ref(), &admission),
                    requires_propagation: self.propagation_gates.contains(gate),
                    latest,
                })
            })
            .collect()
    }

    /// Runs `checks` under `gate` and appends the resulting gate record.
    ///
    /// Returns `GateError::Blocked` without running anything when the prior
    /// gate's latest record for the version is missing or not a pass. A gate
    /// whose checks fail still returns `Ok`; the failure lives in the record.
    pub fn attempt_gate(
        &self,
        gate: &GateId,
        subject_version: &str,
        operator: &str,
        checks: &[&dyn GateCheck],
    ) -> Result<GateRecord, GateError> {
        let admission = self.admission(gate, subject_version)?;
        let current = derive_gate_state(self.latest(gate, subject_version)?.as_ref(), &admission);

        let prior_gate_id = match admission {
            Admission::Blocked { prior, reason } => {
                self.transition(gate, subject_version, current, GateState::Blocked)?;
                return Err(GateError::Blocked {
                    gate: gate.clone(),
                    version: subject_version.to_string(),
                    prior,
                    reason,
                });
            }
            Admission::Proceed { prior } => prior,
        };

        if self.propagation_gates.contains(gate) {
            if let Err(err) = require_propagation_complete(self.store, gate, subject_version) {
                if err.is_blocking() {
                    self.transition(gate, subject_version, current, GateState::Blocked)?;
                }
                return Err(err);
            }
        }

        self.transition(gate, subject_version, current, GateState::InProgress)?;

        let recorder = ValidationRecorder::new(self.store);
        let mut validations = Vec::with_capacity(checks.len());
        for check in checks {
            let outcome = check.run(subject_version);
            validations.push(recorder.record(check.name(), subject_version, outcome)?);
        }

        let (status, tally) = tally_gate(&validations);
        let rec = GateRecord {
            header: RecordHeader::now(RecordKind::Gate),
            gate_id: gate.clone(),
            attempt_id: AttemptId::random(),
            subject_version: subject_version.to_string(),
            status,
            checks_total: tally.total,
            checks_passed: tally.passed,
            checks_failed: tally.failed,
            validation_count: validations.len() as u32,
            operator: operator.to_string(),
            prior_gate_id,
        };
        self.store.append(&rec)?;

        let done = if rec.passed() { GateState::Passed } else { GateState::Failed };
        self.transition(gate, subject_version, GateState::InProgress, done)?;
        Ok(rec)
    }

    fn transition(&self, gate: &GateId, subject_version: &str, from: GateState, to: GateState) -> Result<(), GateError> {
        if !from.can_transition_to(to) {
            return Err(GateError::InvalidTransition { from, to });
        }
        match to {
            GateState::Blocked | GateState::Failed => {
                tracing::warn!(gate = %gate, version = subject_version, %from, %to, "gate transition")
            }
            _ => tracing::info!(gate = %gate, version = subject_version, %from, %to, "gate transition"),
        }
        Ok(())
    }
}
