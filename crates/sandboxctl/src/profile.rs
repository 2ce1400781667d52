use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};
use crate::paths::{expand_user, profile_path};

pub(crate) const DEFAULT_CPUS: u32 = 4;
pub(crate) const DEFAULT_MEMORY: &str = "8GiB";
pub(crate) const DEFAULT_DISK: &str = "50GiB";

/// User profile loaded from `~/.sandboxctl/profile.yaml`.
///
/// Immutable during a run, except for the `--graph` runtime override applied
/// before validation. Every field has a default so a missing file or a
/// partial document still loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub meta: Meta,
    pub mounts: Mounts,
    pub mode: Mode,
    pub resources: Resources,
    pub extra_vars: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    pub assets_dir: String,
}

/// Host paths to mount into the VM. Empty string means "not configured".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mounts {
    pub repo: String,
    pub config: String,
    pub agent_data: String,
    pub buildlog_data: String,
    pub secrets: String,
    pub vault: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mode {
    /// Overlay with periodic sync back to the host; mounts stay read-only.
    pub safe_overlay: bool,
    /// No overlay at all: agent writes go directly to host mounts.
    /// Mutually exclusive with `safe_overlay`.
    pub unsafe_write: bool,
    pub no_docker: bool,
    pub graph: bool,
    pub graph_ports: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub cpus: u32,
    pub memory: String,
    pub disk: String,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            cpus: DEFAULT_CPUS,
            memory: DEFAULT_MEMORY.to_string(),
            disk: DEFAULT_DISK.to_string(),
        }
    }
}

impl Profile {
    /// Expand `~` in every stored path. Applied once at load time so the
    /// rest of the program only ever sees absolute-ish paths.
    fn expand_paths(&mut self) {
        for raw in [
            &mut self.meta.assets_dir,
            &mut self.mounts.repo,
            &mut self.mounts.config,
            &mut self.mounts.agent_data,
            &mut self.mounts.buildlog_data,
            &mut self.mounts.secrets,
            &mut self.mounts.vault,
        ] {
            if !raw.is_empty() {
                *raw = expand_user(raw);
            }
        }
    }
}

fn parse(content: &str) -> CliResult<Profile> {
    let mut profile: Profile = serde_yaml_ng::from_str(content)?;
    profile.expand_paths();
    Ok(profile)
}

/// Load the profile from disk, or return defaults when no file exists.
pub fn load() -> CliResult<Profile> {
    load_from(&profile_path()?)
}

pub fn load_from(path: &Path) -> CliResult<Profile> {
    if !path.exists() {
        return Ok(Profile::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::Config(format!("read {}: {e}", path.display())))?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let profile = load_from(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(profile, Profile::default());
        assert_eq!(profile.resources.cpus, 4);
        assert_eq!(profile.resources.memory, "8GiB");
        assert_eq!(profile.resources.disk, "50GiB");
    }

    #[test]
    fn parse_partial_document_fills_defaults() {
        let profile = parse("mounts:\n  repo: /tmp\nmode:\n  graph: true\n").unwrap();
        assert_eq!(profile.mounts.repo, "/tmp");
        assert!(profile.mode.graph);
        assert!(!profile.mode.safe_overlay);
        assert_eq!(profile.resources.disk, "50GiB");
    }

    #[test]
    fn parse_expands_tilde_in_mounts() {
        let profile = parse("mounts:\n  repo: ~/code/agent\n").unwrap();
        assert!(!profile.mounts.repo.starts_with('~'), "got: {}", profile.mounts.repo);
        assert!(profile.mounts.repo.ends_with("code/agent"));
    }

    #[test]
    fn write_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.yaml");

        let profile = Profile {
            meta: Meta {
                assets_dir: "/opt/assets".into(),
            },
            mounts: Mounts {
                repo: "/code/agent".into(),
                secrets: "/code/secrets.env".into(),
                ..Mounts::default()
            },
            mode: Mode {
                safe_overlay: true,
                graph_ports: vec![7687],
                ..Mode::default()
            },
            resources: Resources {
                cpus: 8,
                memory: "16GiB".into(),
                disk: "100GiB".into(),
            },
            extra_vars: BTreeMap::from([("telegram_user_id".to_string(), "42".to_string())]),
        };

        std::fs::write(&path, serde_yaml_ng::to_string(&profile).unwrap()).unwrap();
        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn extra_vars_keep_stable_order() {
        let profile = parse("extra_vars:\n  zeta: \"1\"\n  alpha: \"2\"\n").unwrap();
        let keys: Vec<&str> = profile.extra_vars.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }
}
