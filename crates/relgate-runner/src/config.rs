use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use relgate_core::{GateId, GateOrder, TargetId};
use relgate_probe::{TargetSource, TargetSpec, RESERVED_FIELDS};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,
    pub logs: LogsConfig,
    #[serde(default)]
    pub gates: GatesConfig,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogsConfig {
    pub dir: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GatesConfig {
    /// Explicit total order. When empty, declared gate ids are ordered naturally.
    #[serde(default)]
    pub order: Vec<GateId>,
    #[serde(default, rename = "gate")]
    pub gates: Vec<GateConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateConfig {
    pub id: GateId,
    #[serde(default)]
    pub requires_propagation: bool,
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckConfig {
    pub name: String,
    pub command: Vec<String>,
}

impl Config {
    pub fn default_for_repo(project_id: &str) -> Self {
        let gate = |id: &str, check: &str| GateConfig {
            id: GateId::new(id),
            requires_propagation: false,
            checks: vec![CheckConfig { name: check.to_string(), command: vec!["true".to_string()] }],
        };
        Self {
            project: ProjectConfig { id: project_id.to_string() },
            logs: LogsConfig { dir: ".relgate/logs".to_string() },
            gates: GatesConfig {
                order: vec![],
                gates: vec![
                    gate("G1", "pre_release_validation"),
                    gate("G2", "release_validation"),
                    gate("G3", "post_release_validation"),
                ],
            },
            targets: vec![],
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse relgate.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".relgate").join("relgate.toml")
    }

    /// Tilde-expanded; relative paths resolve against the repo root.
    pub fn logs_dir(&self, repo_root: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&self.logs.dir).to_string());
        if expanded.is_absolute() {
            expanded
        } else {
            repo_root.join(expanded)
        }
    }

    pub fn gate_order(&self) -> GateOrder {
        if self.gates.order.is_empty() {
            GateOrder::natural(self.gates.gates.iter().map(|g| g.id.clone()))
        } else {
            GateOrder::explicit(self.gates.order.iter().cloned())
        }
    }

    pub fn gate(&self, id: &GateId) -> Option<&GateConfig> {
        self.gates.gates.iter().find(|g| &g.id == id)
    }

    pub fn propagation_gates(&self) -> Vec<GateId> {
        self.gates.gates.iter().filter(|g| g.requires_propagation).map(|g| g.id.clone()).collect()
    }

    /// Targets a release is expected to change.
    pub fn expected_targets(&self) -> Vec<TargetId> {
        self.targets.iter().filter(|t| t.expect_change).map(|t| t.id.clone()).collect()
    }

    /// All targets when `ids` is empty, else exactly those named.
    pub fn select_targets(&self, ids: &[TargetId]) -> Result<Vec<TargetSpec>> {
        if ids.is_empty() {
            return Ok(self.targets.clone());
        }
        ids.iter()
            .map(|id| {
                self.targets
                    .iter()
                    .find(|t| &t.id == id)
                    .cloned()
                    .ok_or_else(|| anyhow!("unknown target {id}; not declared in relgate.toml"))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for g in &self.gates.gates {
            if !seen.insert(&g.id) {
                bail!("duplicate gate id {}", g.id);
            }
            for c in &g.checks {
                if c.command.is_empty() {
                    bail!("gate {} check {} has an empty command", g.id, c.name);
                }
            }
        }
        let mut in_order = HashSet::new();
        for id in &self.gates.order {
            if !seen.contains(id) {
                bail!("gate order names undeclared gate {id}");
            }
            if !in_order.insert(id) {
                bail!("gate order lists {id} twice");
            }
        }
        if !self.gates.order.is_empty() && in_order.len() != seen.len() {
            bail!("gate order must list every declared gate");
        }

        let mut targets = HashSet::new();
        for t in &self.targets {
            if !targets.insert(&t.id) {
                bail!("duplicate target id {}", t.id);
            }
            match &t.source {
                TargetSource::Command { command, .. } if command.is_empty() => {
                    bail!("target {} has an empty probe command", t.id);
                }
                TargetSource::Fs { watch, .. } => {
                    if let Some(clash) = watch.iter().find(|w| RESERVED_FIELDS.contains(&w.as_str())) {
                        bail!("target {} watches {clash}, which collides with a probed field of the same name", t.id);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
[project]
id = "framework"

[logs]
dir = "logs"

[gates]
order = ["G7.0", "G7.1", "G7.2"]

[[gates.gate]]
id = "G7.0"
[[gates.gate.checks]]
name = "pre_release_validation"
command = ["./scripts/pre_release.sh"]

[[gates.gate]]
id = "G7.1"

[[gates.gate]]
id = "G7.2"
requires_propagation = true

[[targets]]
id = "core"
kind = "fs"
root = "../core"
version_file = "VERSION"
watch = ["CHANGELOG.md"]
expect_change = true

[[targets]]
id = "registry"
kind = "command"
command = ["./probe.sh"]
"#;

    #[test]
    fn parses_gates_and_targets() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.gate_order().gates(), ["G7.0", "G7.1", "G7.2"].map(GateId::new).as_slice());
        assert_eq!(cfg.propagation_gates(), vec![GateId::new("G7.2")]);
        assert_eq!(cfg.expected_targets(), vec![TargetId::new("core")]);
        assert_eq!(cfg.gate(&GateId::new("G7.0")).unwrap().checks.len(), 1);
        assert!(matches!(cfg.targets[1].source, TargetSource::Command { .. }));
    }

    #[test]
    fn default_config_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = Config::config_path(dir.path());
        let cfg = Config::default_for_repo("demo");
        cfg.save_to(&path).unwrap();
        let back = Config::load_from(&path).unwrap();
        back.validate().unwrap();
        assert_eq!(back.project.id, "demo");
        assert_eq!(back.gate_order().gates().len(), 3);
        assert_eq!(back.logs_dir(dir.path()), dir.path().join(".relgate/logs"));
    }

    #[test]
    fn natural_order_when_order_is_omitted() {
        let mut cfg = Config::default_for_repo("demo");
        cfg.gates.gates.reverse();
        assert_eq!(cfg.gate_order().first(), Some(&GateId::new("G1")));
    }

    #[test]
    fn rejects_order_with_undeclared_gate() {
        let mut cfg = Config::default_for_repo("demo");
        cfg.gates.order = vec![GateId::new("G1"), GateId::new("G9")];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_watch_path_named_like_a_probed_field() {
        let mut cfg: Config = toml::from_str(SAMPLE).unwrap();
        if let TargetSource::Fs { watch, .. } = &mut cfg.targets[0].source {
            watch.push("version_marker".into());
        }
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("core watches version_marker"));
    }

    #[test]
    fn select_unknown_target_fails() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.select_targets(&[]).unwrap().len(), 2);
        assert!(cfg.select_targets(&[TargetId::new("nope")]).is_err());
    }
}
