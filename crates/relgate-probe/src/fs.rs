use std::path::{Path, PathBuf};

use relgate_core::{ProbeError, TargetState};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::{ProbeContext, StateProbe, TargetSource, TargetSpec};

pub const FIELD_VERSION_MARKER: &str = "version_marker";
pub const FIELD_CHANGELOG_LATEST: &str = "changelog_latest";
pub const FIELD_RELEASE_EXISTS: &str = "release_exists";

/// State keys the probe fills itself; a watched path may not reuse them.
pub const RESERVED_FIELDS: [&str; 3] = [FIELD_VERSION_MARKER, FIELD_CHANGELOG_LATEST, FIELD_RELEASE_EXISTS];

/// Reads version markers, changelog heads, release markers and file
/// fingerprints from a checkout. Relative roots resolve against `base_dir`.
#[derive(Clone, Debug, Default)]
pub struct FsProbe {
    pub base_dir: PathBuf,
}

impl FsProbe {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn io_err(target: &TargetSpec, source: std::io::Error) -> ProbeError {
        ProbeError::Io { target: target.id.to_string(), source }
    }
}

impl StateProbe for FsProbe {
    fn probe(&self, target: &TargetSpec, ctx: &ProbeContext) -> Result<TargetState, ProbeError> {
        let TargetSource::Fs { root, version_file, changelog, release_marker, watch } = &target.source else {
            return Err(ProbeError::Malformed { target: target.id.to_string(), detail: "not a filesystem target".into() });
        };
        let root = self.base_dir.join(root);
        if !root.is_dir() {
            return Err(ProbeError::Unreachable {
                target: target.id.to_string(),
                reason: format!("root {} does not exist", root.display()),
            });
        }

        let mut state = TargetState::new();

        if let Some(rel) = version_file {
            let marker = read_optional(&root.join(rel))
                .map_err(|e| Self::io_err(target, e))?
                .and_then(|s| s.lines().map(str::trim).find(|l| !l.is_empty()).map(str::to_string));
            state.insert(FIELD_VERSION_MARKER.into(), marker.map(Value::String).unwrap_or(Value::Null));
        }

        if let Some(rel) = changelog {
            let head = read_optional(&root.join(rel)).map_err(|e| Self::io_err(target, e))?.and_then(|s| changelog_head(&s));
            state.insert(FIELD_CHANGELOG_LATEST.into(), head.map(Value::String).unwrap_or(Value::Null));
        }

        if let Some(tpl) = release_marker {
            let rel = tpl.replace("{version}", &ctx.subject_version);
            state.insert(FIELD_RELEASE_EXISTS.into(), Value::Bool(root.join(rel).exists()));
        }

        for rel in watch {
            let digest = match std::fs::read(root.join(rel)) {
                Ok(bytes) => Value::String(hex::encode(Sha256::digest(&bytes))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Null,
                Err(e) => return Err(Self::io_err(target, e)),
            };
            state.insert(rel.clone(), digest);
        }

        Ok(state)
    }
}

fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Version named by the first `## ` heading, e.g. `## [3.6.0] - 2026-10-01` -> `3.6.0`.
pub fn changelog_head(text: &str) -> Option<String> {
    let heading = text.lines().find_map(|l| l.strip_prefix("## "))?.trim();
    if let Some(rest) = heading.strip_prefix('[') {
        return rest.split(']').next().map(|s| s.trim().to_string());
    }
    heading.split_whitespace().next().map(str::to_string)
}
