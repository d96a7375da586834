use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use relgate_core::{GateError, GateId, HealthCheck, Phase, SessionId, TargetId};
use relgate_runner::{resolve_operator, ChangeSet, Runner};

const EXIT_OK: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_BLOCKED: u8 = 2;
const EXIT_FATAL: u8 = 3;

#[derive(Parser)]
#[command(name = "relgate", version, about = "Release gate enforcement and audit log")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PhaseArg {
    Pre,
    Post,
}

impl PhaseArg {
    fn as_phase(self) -> Phase {
        match self {
            PhaseArg::Pre => Phase::PreRelease,
            PhaseArg::Post => Phase::PostRelease,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Initialize relgate in the current repo (creates .relgate/, config, logs)
    Init,

    /// Validate config, logs directory and log integrity
    Doctor,

    /// Record counts per log
    Status,

    /// Run a validation script and record its outcome; exits with the script's code
    Validate {
        #[arg(long)]
        script: String,
        #[arg(long)]
        version: String,
        #[arg(last = true, required = true)]
        argv: Vec<String>,
    },

    /// Attempt a gate for a version
    RunGate {
        #[arg(long)]
        gate: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        operator: Option<String>,
    },

    /// Show every configured gate's state for a version
    GateStatus {
        #[arg(long)]
        version: String,
    },

    /// Capture a pre- or post-release snapshot
    Snapshot {
        #[arg(long)]
        version: String,
        #[arg(long, value_enum)]
        phase: PhaseArg,
        /// Limit to these targets (repeatable)
        #[arg(long = "target")]
        targets: Vec<String>,
    },

    /// Compare the pre- and post-release snapshots of a version
    Diff {
        #[arg(long)]
        version: String,
        /// Targets expected to change; defaults to those configured with expect_change
        #[arg(long, value_delimiter = ',')]
        expect: Option<Vec<String>>,
    },

    /// Check that a change set landed on every target
    Audit {
        #[arg(long)]
        version: String,
        /// YAML change set
        #[arg(long)]
        changes: PathBuf,
        #[arg(long)]
        source: Option<String>,
        #[arg(long = "target")]
        targets: Vec<String>,
    },

    /// Record a health snapshot from a JSON array of {name, status, details}
    HealthRecord {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        session: Option<String>,
    },

    /// Health summaries over time
    HealthTrend,

    /// Every failing check recorded for a version
    Failures {
        #[arg(long)]
        version: String,
    },

    /// Per-version results of one script
    Trend {
        #[arg(long)]
        script: String,
    },

    /// Checks that passed in one version and fail in another
    Regressions {
        #[arg(long)]
        script: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            let code = exit_code_for(&err);
            if code == EXIT_BLOCKED {
                eprintln!("BLOCKED: {err:#}");
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(code)
        }
    }
}

/// Blocking gate errors exit 2; everything else that escapes `run` is fatal.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<GateError>() {
        Some(gate_err) if gate_err.is_blocking() => EXIT_BLOCKED,
        _ => EXIT_FATAL,
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn target_ids(ids: Vec<String>) -> Vec<TargetId> {
    ids.into_iter().map(TargetId::new).collect()
}

fn run(cli: Cli) -> Result<u8> {
    let repo_root = std::env::current_dir()?;
    let json = cli.json;
    tracing::debug!(repo_root = %repo_root.display(), "relgate starting");

    match cli.cmd {
        Command::Init => {
            Runner::init_repo(&repo_root)?;
            println!("Initialized relgate in {}", repo_root.display());
        }
        Command::Doctor => {
            let r = Runner::open(repo_root)?;
            r.doctor()?;
            println!("OK");
        }
        Command::Status => {
            let r = Runner::open(repo_root)?;
            let counts = r.history().status()?;
            if json {
                let map: serde_json::Map<String, serde_json::Value> =
                    counts.iter().map(|(k, n)| (k.to_string(), serde_json::Value::from(*n))).collect();
                print_json(&map)?;
            } else {
                println!("Logs: {}", r.store.root().display());
                for (kind, n) in counts {
                    println!("- {kind}: {n}");
                }
            }
        }
        Command::Validate { script, version, argv } => {
            let r = Runner::open(repo_root)?;
            let (rec, out) = r.run_validation(&script, &version, &argv)?;
            print!("{}", out.stdout);
            eprint!("{}", out.stderr);
            if json {
                print_json(&rec)?;
            } else {
                println!(
                    "{} {}: exit {} ({} passed, {} failed)",
                    rec.script_name, rec.subject_version, rec.exit_code, rec.checks_passed, rec.checks_failed
                );
            }
            return Ok(u8::try_from(rec.exit_code).unwrap_or(EXIT_FAILED));
        }
        Command::RunGate { gate, version, operator } => {
            let r = Runner::open(repo_root)?;
            let rec = r.run_gate(&GateId::new(gate), &version, &resolve_operator(operator))?;
            if json {
                print_json(&rec)?;
            } else {
                println!(
                    "{} {}: {:?} ({}/{} checks passed)",
                    rec.gate_id, rec.subject_version, rec.status, rec.checks_passed, rec.checks_total
                );
            }
            if !rec.passed() {
                return Ok(EXIT_FAILED);
            }
        }
        Command::GateStatus { version } => {
            let r = Runner::open(repo_root)?;
            let report = r.gate_report(&version)?;
            if json {
                print_json(&report)?;
            } else {
                for e in report {
                    let by = e.latest.as_ref().map(|l| format!(" by {} at {}", l.operator, l.header.timestamp)).unwrap_or_default();
                    let prop = if e.requires_propagation { " [propagation]" } else { "" };
                    println!("- {} {}{}{}", e.gate_id, e.state, prop, by);
                }
            }
        }
        Command::Snapshot { version, phase, targets } => {
            let r = Runner::open(repo_root)?;
            let snap = r.snapshot(&version, phase.as_phase(), &target_ids(targets))?;
            if json {
                print_json(&snap)?;
            } else {
                println!("{} snapshot for {} ({} targets)", snap.phase, snap.subject_version, snap.targets.len());
                for (id, obs) in &snap.targets {
                    match obs.state() {
                        Some(state) => println!("- {id}: {}", serde_json::to_string(state)?),
                        None => println!("- {id}: unknown"),
                    }
                }
            }
        }
        Command::Diff { version, expect } => {
            let r = Runner::open(repo_root)?;
            let (diff, expected) = r.diff(&version, expect.map(target_ids))?;
            if json {
                print_json(&diff)?;
            } else {
                println!("changed: {:?}", diff.changed_targets.iter().map(|t| t.as_str()).collect::<Vec<_>>());
                println!("unchanged: {:?}", diff.unchanged_targets.iter().map(|t| t.as_str()).collect::<Vec<_>>());
                for t in &diff.unexpected_unchanged {
                    println!("GAP: {t} was expected to change but did not");
                }
                for u in &diff.unknown_targets {
                    println!("UNKNOWN: {} ({})", u.target, u.reason);
                }
            }
            if diff.has_gaps(&expected) {
                return Ok(EXIT_FAILED);
            }
        }
        Command::Audit { version, changes, source, targets } => {
            let r = Runner::open(repo_root)?;
            let cs = ChangeSet::load_from(&changes)?;
            let rec = r.audit(&version, &cs, source.as_deref(), &target_ids(targets))?;
            if json {
                print_json(&rec)?;
            } else {
                for t in &rec.targets {
                    let state = if t.complete { "complete" } else { "INCOMPLETE" };
                    println!("- {} {state} missing={:?}", t.target_id, t.missing);
                    if let Some(err) = &t.error {
                        println!("    {err}");
                    }
                }
                println!("all_complete: {}", rec.all_complete);
            }
            if !rec.all_complete {
                return Ok(EXIT_FAILED);
            }
        }
        Command::HealthRecord { input, session } => {
            let r = Runner::open(repo_root)?;
            let raw = std::fs::read_to_string(&input).with_context(|| format!("read {}", input.display()))?;
            let checks: Vec<HealthCheck> =
                serde_json::from_str(&raw).with_context(|| format!("parse health checks in {}", input.display()))?;
            let rec = r.record_health(session.map(SessionId::new), checks)?;
            if json {
                print_json(&rec)?;
            } else {
                println!(
                    "session {}: ok={} warn={} critical={}",
                    rec.session_id, rec.summary.ok, rec.summary.warn, rec.summary.critical
                );
            }
        }
        Command::HealthTrend => {
            let r = Runner::open(repo_root)?;
            let trend = r.history().health_trend()?;
            if json {
                print_json(&trend)?;
            } else {
                for p in trend {
                    let delta = p
                        .delta
                        .map(|d| format!(" (ok {:+}, warn {:+}, critical {:+})", d.ok, d.warn, d.critical))
                        .unwrap_or_default();
                    println!(
                        "{} {}: ok={} warn={} critical={}{}",
                        p.timestamp, p.session_id, p.summary.ok, p.summary.warn, p.summary.critical, delta
                    );
                }
            }
        }
        Command::Failures { version } => {
            let r = Runner::open(repo_root)?;
            let failures = r.history().failures_for_version(&version)?;
            if json {
                print_json(&failures)?;
            } else {
                println!("{} failing checks for {version}", failures.len());
                for f in &failures {
                    println!("- {}::{} {}", f.script_name, f.check, f.error.as_deref().unwrap_or(""));
                }
            }
        }
        Command::Trend { script } => {
            let r = Runner::open(repo_root)?;
            let trend = r.history().validation_trend(&script)?;
            if json {
                print_json(&trend)?;
            } else {
                for p in trend {
                    println!(
                        "{}: {} runs ({} passed, {} failed); latest {} passed / {} failed",
                        p.subject_version, p.runs, p.passed_runs, p.failed_runs, p.checks_passed, p.checks_failed
                    );
                }
            }
        }
        Command::Regressions { script, from, to } => {
            let r = Runner::open(repo_root)?;
            let Some(regressed) = r.history().regressions(&script, &from, &to)? else {
                bail!("no recorded run of {script} for both {from} and {to}");
            };
            if json {
                print_json(&regressed)?;
            } else if regressed.is_empty() {
                println!("no regressions in {script} from {from} to {to}");
            } else {
                for name in &regressed {
                    println!("REGRESSED: {name}");
                }
            }
            if !regressed.is_empty() {
                return Ok(EXIT_FAILED);
            }
        }
    }

    Ok(EXIT_OK)
}
