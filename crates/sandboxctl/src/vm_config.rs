use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{CliError, CliResult};
use crate::paths::resolve;
use crate::profile::Profile;

/// Default port forward: the agent gateway.
pub const GATEWAY_PORT: u16 = 18789;

/// Fixed forwards added by graph mode: bolt, web UI, monitoring.
const GRAPH_PORTS: [u16; 3] = [7687, 3000, 7444];

/// A single host→VM mount.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountSpec {
    pub mount_point: String,
    pub location: PathBuf,
    pub writable: bool,
}

/// A single port-forward rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForwardSpec {
    pub guest_port: u16,
    pub host_port: u16,
    pub proto: &'static str,
}

impl PortForwardSpec {
    fn tcp(port: u16) -> Self {
        Self {
            guest_port: port,
            host_port: port,
            proto: "tcp",
        }
    }
}

/// Everything the rendered VM config document needs.
#[derive(Debug, Clone, PartialEq)]
pub struct VmConfigContext {
    pub cpus: u32,
    pub memory: String,
    pub disk: String,
    pub mounts: Vec<MountSpec>,
    pub port_forwards: Vec<PortForwardSpec>,
}

/// Translate a profile into a [`VmConfigContext`].
///
/// Single source of truth for mount topology: the same call drives config
/// generation and later mount verification, so it must stay idempotent.
/// The only side effect is `mkdir -p` for the two data directories, which is
/// safe to repeat.
pub fn build_context(profile: &Profile, assets_dir: &Path) -> CliResult<VmConfigContext> {
    let writable = profile.mode.unsafe_write;
    let mut mounts = Vec::new();

    if !profile.mounts.repo.is_empty() {
        mounts.push(MountSpec {
            mount_point: "/mnt/repo".to_string(),
            location: resolve(Path::new(&profile.mounts.repo)),
            writable,
        });
    }

    // Provisioning assets are always mounted, always read-only.
    mounts.push(MountSpec {
        mount_point: "/mnt/provision".to_string(),
        location: resolve(assets_dir),
        writable: false,
    });

    if !profile.mounts.vault.is_empty() {
        mounts.push(MountSpec {
            mount_point: "/mnt/vault".to_string(),
            location: resolve(Path::new(&profile.mounts.vault)),
            writable,
        });
    }

    if !profile.mounts.config.is_empty() {
        mounts.push(MountSpec {
            mount_point: "/mnt/config".to_string(),
            location: resolve(Path::new(&profile.mounts.config)),
            writable,
        });
    }

    // Data directories are always writable and created on the host if absent.
    for (raw, mount_point) in [
        (&profile.mounts.agent_data, "/mnt/agent-data"),
        (&profile.mounts.buildlog_data, "/mnt/buildlog-data"),
    ] {
        if raw.is_empty() {
            continue;
        }
        let path = Path::new(raw);
        std::fs::create_dir_all(path)
            .map_err(|e| CliError::Config(format!("create {}: {e}", path.display())))?;
        mounts.push(MountSpec {
            mount_point: mount_point.to_string(),
            location: resolve(path),
            writable: true,
        });
    }

    // The secrets mount exposes the parent directory, not the file itself.
    if !profile.mounts.secrets.is_empty() {
        let secrets = resolve(Path::new(&profile.mounts.secrets));
        let parent = secrets
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        mounts.push(MountSpec {
            mount_point: "/mnt/secrets".to_string(),
            location: parent,
            writable: false,
        });
    }

    let mut port_forwards = vec![PortForwardSpec::tcp(GATEWAY_PORT)];
    if profile.mode.graph {
        // The graph flag wins outright; explicit ports are ignored.
        port_forwards.extend(GRAPH_PORTS.map(PortForwardSpec::tcp));
    } else {
        port_forwards.extend(profile.mode.graph_ports.iter().copied().map(PortForwardSpec::tcp));
    }

    Ok(VmConfigContext {
        cpus: profile.resources.cpus,
        memory: profile.resources.memory.clone(),
        disk: profile.resources.disk.clone(),
        mounts,
        port_forwards,
    })
}

/// Basename of the secrets file, or empty string when unset.
pub fn secrets_filename(profile: &Profile) -> String {
    if profile.mounts.secrets.is_empty() {
        return String::new();
    }
    resolve(Path::new(&profile.mounts.secrets))
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

// -- rendering ------------------------------------------------------------

const SYSTEM_PROVISION_SCRIPT: &str = "\
#!/bin/bash
set -eux -o pipefail
export DEBIAN_FRONTEND=noninteractive
apt-get update
apt-get install -y python3 rsync
";

const USER_PROVISION_SCRIPT: &str = "\
#!/bin/bash
set -eu
mkdir -p ~/.ssh
chmod 700 ~/.ssh
";

const IMAGE_X86_64: &str =
    "https://cloud-images.ubuntu.com/releases/noble/release/ubuntu-24.04-server-cloudimg-amd64.img";
const IMAGE_AARCH64: &str =
    "https://cloud-images.ubuntu.com/releases/noble/release/ubuntu-24.04-server-cloudimg-arm64.img";

#[derive(Serialize)]
struct ProvisionScript {
    mode: &'static str,
    script: &'static str,
}

#[derive(Serialize)]
struct EnvBlock {
    #[serde(rename = "AGENT_SANDBOX")]
    agent_sandbox: &'static str,
}

#[derive(Serialize)]
struct ImageSpec {
    location: &'static str,
    arch: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SshBlock {
    local_port: u16,
    #[serde(rename = "loadDotSSHPubKeys")]
    load_dot_ssh_pub_keys: bool,
}

#[derive(Serialize)]
struct ContainerdBlock {
    system: bool,
    user: bool,
}

#[derive(Serialize)]
struct RosettaBlock {
    enabled: bool,
    binfmt: bool,
}

#[derive(Serialize)]
struct VzOpts {
    rosetta: RosettaBlock,
}

#[derive(Serialize)]
struct VmOpts {
    vz: VzOpts,
}

/// The full declarative VM config document. Field order here is the key
/// order in the written YAML.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigDoc<'a> {
    vm_type: &'static str,
    cpus: u32,
    memory: &'a str,
    disk: &'a str,
    mounts: &'a [MountSpec],
    port_forwards: &'a [PortForwardSpec],
    provision: [ProvisionScript; 2],
    env: EnvBlock,
    images: [ImageSpec; 2],
    ssh: SshBlock,
    // The VM hosts its own container tooling; Lima's containerd stays off.
    containerd: ContainerdBlock,
    vm_opts: VmOpts,
}

/// Render the VM config YAML from a context. Pure: every conditional was
/// already resolved by [`build_context`].
pub fn render_config(context: &VmConfigContext) -> CliResult<String> {
    let doc = ConfigDoc {
        vm_type: "vz",
        cpus: context.cpus,
        memory: &context.memory,
        disk: &context.disk,
        mounts: &context.mounts,
        port_forwards: &context.port_forwards,
        provision: [
            ProvisionScript {
                mode: "system",
                script: SYSTEM_PROVISION_SCRIPT,
            },
            ProvisionScript {
                mode: "user",
                script: USER_PROVISION_SCRIPT,
            },
        ],
        env: EnvBlock {
            agent_sandbox: "true",
        },
        images: [
            ImageSpec {
                location: IMAGE_X86_64,
                arch: "x86_64",
            },
            ImageSpec {
                location: IMAGE_AARCH64,
                arch: "aarch64",
            },
        ],
        ssh: SshBlock {
            local_port: 0,
            load_dot_ssh_pub_keys: true,
        },
        containerd: ContainerdBlock {
            system: false,
            user: false,
        },
        vm_opts: VmOpts {
            vz: VzOpts {
                rosetta: RosettaBlock {
                    enabled: true,
                    binfmt: true,
                },
            },
        },
    };
    Ok(serde_yaml_ng::to_string(&doc)?)
}

/// Build context, render, and write `lima/<vm_name>.generated.yaml` under
/// the assets directory. Returns the written path.
pub fn write_config(profile: &Profile, assets_dir: &Path, vm_name: &str) -> CliResult<PathBuf> {
    let context = build_context(profile, assets_dir)?;
    let yaml = render_config(&context)?;
    let out_dir = assets_dir.join("lima");
    std::fs::create_dir_all(&out_dir)
        .map_err(|e| CliError::Config(format!("create {}: {e}", out_dir.display())))?;
    let out_path = out_dir.join(format!("{vm_name}.generated.yaml"));
    std::fs::write(&out_path, yaml)
        .map_err(|e| CliError::Config(format!("write {}: {e}", out_path.display())))?;
    Ok(out_path)
}

/// Path where [`write_config`] places (or previously placed) the document.
pub fn config_path(assets_dir: &Path, vm_name: &str) -> PathBuf {
    assets_dir.join("lima").join(format!("{vm_name}.generated.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Mode, Mounts, Resources};
    use serde_yaml_ng::Value;

    fn assets_dir(dir: &Path) -> PathBuf {
        let assets = dir.join("assets");
        std::fs::create_dir_all(assets.join("ansible")).unwrap();
        std::fs::write(assets.join("ansible/playbook.yml"), "---\n").unwrap();
        assets
    }

    /// Profile with every mount role configured under `dir`.
    fn full_profile(dir: &Path) -> Profile {
        for sub in ["repo", "vault", "config", "agents", "buildlog"] {
            std::fs::create_dir_all(dir.join(sub)).unwrap();
        }
        std::fs::write(dir.join("secrets.env"), "ANTHROPIC_API_KEY=x\n").unwrap();
        Profile {
            mounts: Mounts {
                repo: dir.join("repo").display().to_string(),
                vault: dir.join("vault").display().to_string(),
                config: dir.join("config").display().to_string(),
                agent_data: dir.join("agents").display().to_string(),
                buildlog_data: dir.join("buildlog").display().to_string(),
                secrets: dir.join("secrets.env").display().to_string(),
            },
            mode: Mode {
                graph: true,
                ..Mode::default()
            },
            resources: Resources {
                cpus: 8,
                memory: "16GiB".into(),
                disk: "100GiB".into(),
            },
            ..Profile::default()
        }
    }

    #[test]
    fn mount_order_is_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_dir(dir.path());
        let ctx = build_context(&full_profile(dir.path()), &assets).unwrap();
        let points: Vec<&str> = ctx.mounts.iter().map(|m| m.mount_point.as_str()).collect();
        assert_eq!(
            points,
            vec![
                "/mnt/repo",
                "/mnt/provision",
                "/mnt/vault",
                "/mnt/config",
                "/mnt/agent-data",
                "/mnt/buildlog-data",
                "/mnt/secrets",
            ]
        );
    }

    #[test]
    fn build_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_dir(dir.path());
        let profile = full_profile(dir.path());
        let first = build_context(&profile, &assets).unwrap();
        let second = build_context(&profile, &assets).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn provision_mount_always_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_dir(dir.path());
        let profile = Profile {
            mode: Mode {
                unsafe_write: true,
                ..Mode::default()
            },
            ..Profile::default()
        };
        let ctx = build_context(&profile, &assets).unwrap();
        let provision = ctx
            .mounts
            .iter()
            .find(|m| m.mount_point == "/mnt/provision")
            .unwrap();
        assert!(!provision.writable);
    }

    #[test]
    fn repo_writable_only_in_unsafe_write_mode() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_dir(dir.path());
        let mut profile = full_profile(dir.path());

        let ctx = build_context(&profile, &assets).unwrap();
        let repo = ctx.mounts.iter().find(|m| m.mount_point == "/mnt/repo").unwrap();
        assert!(!repo.writable);

        profile.mode.unsafe_write = true;
        let ctx = build_context(&profile, &assets).unwrap();
        let repo = ctx.mounts.iter().find(|m| m.mount_point == "/mnt/repo").unwrap();
        assert!(repo.writable);
        let vault = ctx.mounts.iter().find(|m| m.mount_point == "/mnt/vault").unwrap();
        assert!(vault.writable);
    }

    #[test]
    fn data_mounts_always_writable_and_created() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_dir(dir.path());
        let agent_dir = dir.path().join("missing-agents");
        let profile = Profile {
            mounts: Mounts {
                agent_data: agent_dir.display().to_string(),
                ..Mounts::default()
            },
            ..Profile::default()
        };
        let ctx = build_context(&profile, &assets).unwrap();
        assert!(agent_dir.is_dir(), "agent data dir should be created");
        let agent = ctx
            .mounts
            .iter()
            .find(|m| m.mount_point == "/mnt/agent-data")
            .unwrap();
        assert!(agent.writable);
    }

    #[test]
    fn secrets_mounts_parent_dir_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_dir(dir.path());
        let ctx = build_context(&full_profile(dir.path()), &assets).unwrap();
        let secrets = ctx
            .mounts
            .iter()
            .find(|m| m.mount_point == "/mnt/secrets")
            .unwrap();
        assert!(secrets.location.is_dir());
        assert!(!secrets.writable);
    }

    #[test]
    fn graph_flag_wins_over_explicit_ports() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_dir(dir.path());
        let profile = Profile {
            mode: Mode {
                graph: true,
                graph_ports: vec![9999],
                ..Mode::default()
            },
            ..Profile::default()
        };
        let ctx = build_context(&profile, &assets).unwrap();
        let ports: Vec<u16> = ctx.port_forwards.iter().map(|p| p.guest_port).collect();
        assert_eq!(ports, vec![GATEWAY_PORT, 7687, 3000, 7444]);
        assert!(!ports.contains(&9999));
    }

    #[test]
    fn explicit_graph_ports_used_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_dir(dir.path());
        let profile = Profile {
            mode: Mode {
                graph_ports: vec![7687, 7444],
                ..Mode::default()
            },
            ..Profile::default()
        };
        let ctx = build_context(&profile, &assets).unwrap();
        let ports: Vec<u16> = ctx.port_forwards.iter().map(|p| p.guest_port).collect();
        assert_eq!(ports, vec![GATEWAY_PORT, 7687, 7444]);
        assert!(!ports.contains(&3000));
    }

    #[test]
    fn rendered_yaml_has_expected_shape() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_dir(dir.path());
        let ctx = build_context(&full_profile(dir.path()), &assets).unwrap();
        let text = render_config(&ctx).unwrap();
        let doc: Value = serde_yaml_ng::from_str(&text).unwrap();

        assert_eq!(doc["vmType"], "vz");
        assert_eq!(doc["cpus"], 8);
        assert_eq!(doc["memory"], "16GiB");
        assert_eq!(doc["disk"], "100GiB");
        assert_eq!(doc["env"]["AGENT_SANDBOX"], "true");
        assert_eq!(doc["ssh"]["localPort"], 0);
        assert_eq!(doc["ssh"]["loadDotSSHPubKeys"], true);
        assert_eq!(doc["containerd"]["system"], false);
        assert_eq!(doc["containerd"]["user"], false);
        assert_eq!(doc["vmOpts"]["vz"]["rosetta"]["enabled"], true);

        let provision = doc["provision"].as_sequence().unwrap();
        assert_eq!(provision.len(), 2);
        assert_eq!(provision[0]["mode"], "system");
        assert_eq!(provision[1]["mode"], "user");

        let archs: Vec<&str> = doc["images"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|i| i["arch"].as_str().unwrap())
            .collect();
        assert_eq!(archs, vec!["x86_64", "aarch64"]);
    }

    #[test]
    fn writable_is_a_native_yaml_bool() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_dir(dir.path());
        let ctx = build_context(&full_profile(dir.path()), &assets).unwrap();
        let text = render_config(&ctx).unwrap();
        let doc: Value = serde_yaml_ng::from_str(&text).unwrap();
        let mounts = doc["mounts"].as_sequence().unwrap();
        let repo = mounts
            .iter()
            .find(|m| m["mountPoint"] == "/mnt/repo")
            .unwrap();
        assert_eq!(repo["writable"], Value::Bool(false));
    }

    #[test]
    fn write_config_places_document_under_lima_dir() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_dir(dir.path());
        let profile = full_profile(dir.path());
        let path = write_config(&profile, &assets, "agent-sandbox").unwrap();
        assert!(path.exists());
        assert_eq!(path, config_path(&assets, "agent-sandbox"));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "agent-sandbox.generated.yaml"
        );
        let doc: Value =
            serde_yaml_ng::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["cpus"], 8);
    }

    #[test]
    fn secrets_filename_is_basename_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        let profile = full_profile(dir.path());
        assert_eq!(secrets_filename(&profile), "secrets.env");
        assert_eq!(secrets_filename(&Profile::default()), "");
    }
}
