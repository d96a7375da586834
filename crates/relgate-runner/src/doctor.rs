use anyhow::{Context, Result};
use std::path::Path;

use relgate_core::{GateRecord, HealthRecord, PropagationAuditRecord, ReleaseSnapshot, ValidationRecord};
use relgate_storage::LogStoreExt;
use relgate_storage_jsonl::JsonlLogStore;

use crate::Config;

pub fn doctor(repo_root: &Path, cfg: &Config) -> Result<()> {
    cfg.validate().context("invalid relgate.toml")?;

    // logs dir must be writable
    let logs = cfg.logs_dir(repo_root);
    std::fs::create_dir_all(&logs).with_context(|| format!("create logs dir {}", logs.display()))?;
    let probe = logs.join(".relgate-doctor");
    std::fs::write(&probe, b"ok").with_context(|| format!("logs dir {} is not writable", logs.display()))?;
    std::fs::remove_file(&probe).with_context(|| format!("remove {}", probe.display()))?;

    // every complete line in every partition must parse
    let store = JsonlLogStore::open(&logs)?;
    let validations = store.read_all::<ValidationRecord>()?.len();
    let gates = store.read_all::<GateRecord>()?.len();
    let snapshots = store.read_all::<ReleaseSnapshot>()?.len();
    let audits = store.read_all::<PropagationAuditRecord>()?.len();
    let health = store.read_all::<HealthRecord>()?.len();
    tracing::debug!(validations, gates, snapshots, audits, health, "doctor: logs parse");

    for t in &cfg.targets {
        if let relgate_probe::TargetSource::Fs { root, .. } = &t.source {
            if !repo_root.join(root).is_dir() {
                tracing::warn!(target_id = %t.id, root = %root.display(), "doctor: target root missing; snapshots will record it as unknown");
            }
        }
    }
    Ok(())
}
