use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use relgate_core::CheckDetail;

use crate::recorder::ValidationOutcome;

/// Output of one wrapped validation script.
#[derive(Clone, Debug)]
pub struct ScriptRun {
    pub outcome: ValidationOutcome,
    pub stdout: String,
    pub stderr: String,
}

/// Run `argv` in `dir` with `RELGATE_VERSION` set.
///
/// Each stdout line that parses as `{"name", "status", "error"?}` becomes a
/// check detail. With none, one detail named after the script is derived
/// from the exit code. A script that cannot be started yields exit code 127.
pub fn run_script(script_name: &str, argv: &[String], dir: &Path, subject_version: &str) -> ScriptRun {
    let Some((program, args)) = argv.split_first() else {
        return ScriptRun {
            outcome: ValidationOutcome::invocation_failed(script_name, "empty command"),
            stdout: String::new(),
            stderr: String::new(),
        };
    };

    let out = match Command::new(program).args(args).current_dir(dir).env("RELGATE_VERSION", subject_version).output() {
        Ok(out) => out,
        Err(e) => {
            tracing::warn!(script = script_name, program = %program, error = %e, "validation script could not be invoked");
            return ScriptRun {
                outcome: ValidationOutcome::invocation_failed(script_name, format!("{program}: {e}")),
                stdout: String::new(),
                stderr: String::new(),
            };
        }
    };

    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();
    let exit_code = exit_code(&out.status);

    let mut checks = parse_checks(&stdout);
    if checks.is_empty() {
        checks.push(if exit_code == 0 {
            CheckDetail::pass(script_name)
        } else {
            let last = stderr.lines().rev().map(str::trim).find(|l| !l.is_empty());
            CheckDetail::fail(script_name, last.map(str::to_string).unwrap_or_else(|| format!("exit code {exit_code}")))
        });
    }

    ScriptRun { outcome: ValidationOutcome::new(exit_code, checks), stdout, stderr }
}

pub fn parse_checks(stdout: &str) -> Vec<CheckDetail> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .filter_map(|l| serde_json::from_str::<CheckDetail>(l).ok())
        .collect()
}

#[cfg(unix)]
fn exit_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|s| 128 + s)).unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// A configured script bound to a working directory.
#[derive(Clone, Debug)]
pub struct ScriptCheck {
    pub name: String,
    pub argv: Vec<String>,
    pub dir: PathBuf,
}
