use std::path::PathBuf;
use std::process::Command;

use relgate_core::{ProbeError, TargetState};

use crate::types::{ProbeContext, StateProbe, TargetSource, TargetSpec};

/// Runs an external probe script. The script receives `RELGATE_TARGET` and
/// `RELGATE_VERSION` in its environment and must print one JSON object.
#[derive(Clone, Debug, Default)]
pub struct CommandProbe {
    pub base_dir: PathBuf,
}

impl CommandProbe {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }
}

impl StateProbe for CommandProbe {
    fn probe(&self, target: &TargetSpec, ctx: &ProbeContext) -> Result<TargetState, ProbeError> {
        let TargetSource::Command { command, dir } = &target.source else {
            return Err(ProbeError::Malformed { target: target.id.to_string(), detail: "not a command target".into() });
        };
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ProbeError::Malformed { target: target.id.to_string(), detail: "empty command".into() })?;

        let cwd = dir.as_ref().map(|d| self.base_dir.join(d)).unwrap_or_else(|| self.base_dir.clone());
        let mut cmd = Command::new(program);
        cmd.args(args).env("RELGATE_TARGET", target.id.as_str()).env("RELGATE_VERSION", &ctx.subject_version);
        if !cwd.as_os_str().is_empty() {
            cmd.current_dir(&cwd);
        }

        let out = cmd.output().map_err(|e| ProbeError::Unreachable {
            target: target.id.to_string(),
            reason: format!("could not run {program}: {e}"),
        })?;
        if !out.status.success() {
            return Err(ProbeError::Command {
                target: target.id.to_string(),
                detail: format!(
                    "{:?} exited with {}\nstderr:{}",
                    command,
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            });
        }

        serde_json::from_slice::<TargetState>(&out.stdout)
            .map_err(|e| ProbeError::Malformed { target: target.id.to_string(), detail: format!("expected a JSON object: {e}") })
    }
}
