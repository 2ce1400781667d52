use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use limavm::SshDetails;
use tokio::process::Command;
use tracing::debug;

use crate::error::{CliError, CliResult};
use crate::profile::Profile;
use crate::vm_config::secrets_filename;

/// Bound on the remote-copy invocation.
const COPY_TIMEOUT: Duration = Duration::from_secs(120);

/// Provisioning-engine invocation, as seen by the orchestrator.
#[async_trait]
pub trait ProvisionRunner: Send + Sync {
    /// Apply the playbook to the VM. Returns the engine's exit code.
    async fn provision(
        &self,
        profile: &Profile,
        ssh: &SshDetails,
        assets_dir: &Path,
        vm_name: &str,
    ) -> CliResult<i32>;

    /// Copy `source` to `target` on the VM, using `remote_shell` as the
    /// rsync transport. Returns whether the copy succeeded.
    async fn copy_to_vm(&self, source: &str, target: &str, remote_shell: &str) -> bool;
}

pub struct AnsibleRunner;

#[async_trait]
impl ProvisionRunner for AnsibleRunner {
    async fn provision(
        &self,
        profile: &Profile,
        ssh: &SshDetails,
        assets_dir: &Path,
        vm_name: &str,
    ) -> CliResult<i32> {
        run_playbook(profile, ssh, assets_dir, vm_name).await
    }

    async fn copy_to_vm(&self, source: &str, target: &str, remote_shell: &str) -> bool {
        let result = tokio::time::timeout(
            COPY_TIMEOUT,
            Command::new("rsync")
                .arg("-a")
                .arg("--delete")
                .arg("-e")
                .arg(remote_shell)
                .arg(source)
                .arg(target)
                .status(),
        )
        .await;
        matches!(&result, Ok(Ok(status)) if status.success())
    }
}

/// Build an INI-format inventory for the single-VM host group.
pub fn build_inventory(vm_name: &str, ssh: &SshDetails) -> String {
    format!(
        "[sandbox]\n\
         {vm_name} \
         ansible_host={host} \
         ansible_port={port} \
         ansible_user={user} \
         ansible_ssh_private_key_file={key} \
         ansible_ssh_common_args='-o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null'\n",
        host = ssh.host,
        port = ssh.port,
        user = ssh.user,
        key = ssh.key_path,
    )
}

fn current_user() -> String {
    let uid = nix::unistd::getuid();
    nix::unistd::User::from_uid(uid)
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Build the ordered `-e key=value` argument list.
///
/// Built-ins come first so a user-supplied duplicate appended later wins at
/// the engine level.
pub fn build_extra_vars(profile: &Profile) -> Vec<String> {
    let agent_mount = if profile.mounts.agent_data.is_empty() {
        ""
    } else {
        "/mnt/agent-data"
    };
    let buildlog_mount = if profile.mounts.buildlog_data.is_empty() {
        ""
    } else {
        "/mnt/buildlog-data"
    };

    let pairs: Vec<(&str, String)> = vec![
        ("tenant_name", current_user()),
        ("provision_path", "/mnt/provision".to_string()),
        ("repo_path", "/mnt/repo".to_string()),
        ("vault_path", "/mnt/vault".to_string()),
        ("secrets_filename", secrets_filename(profile)),
        ("overlay_safe_mode", profile.mode.safe_overlay.to_string()),
        ("overlay_unsafe_write", profile.mode.unsafe_write.to_string()),
        ("docker_enabled", (!profile.mode.no_docker).to_string()),
        ("agent_data_mount", agent_mount.to_string()),
        ("buildlog_data_mount", buildlog_mount.to_string()),
        ("graph_enabled", profile.mode.graph.to_string()),
    ];

    let mut argv = Vec::with_capacity((pairs.len() + profile.extra_vars.len()) * 2);
    for (key, value) in pairs {
        argv.push("-e".to_string());
        argv.push(format!("{key}={value}"));
    }
    for (key, value) in &profile.extra_vars {
        argv.push("-e".to_string());
        argv.push(format!("{key}={value}"));
    }
    argv
}

/// Write a temp inventory, run `ansible-playbook`, clean up.
///
/// Returns the engine's exit code unmodified. The inventory file is removed
/// on every exit path, since `NamedTempFile` deletes on drop.
pub async fn run_playbook(
    profile: &Profile,
    ssh: &SshDetails,
    assets_dir: &Path,
    vm_name: &str,
) -> CliResult<i32> {
    let playbook = assets_dir.join("ansible").join("playbook.yml");

    let mut inventory = tempfile::Builder::new()
        .prefix("sandboxctl-inv-")
        .suffix(".ini")
        .tempfile()
        .map_err(|e| CliError::Config(format!("create inventory temp file: {e}")))?;
    inventory
        .write_all(build_inventory(vm_name, ssh).as_bytes())
        .map_err(|e| CliError::Config(format!("write inventory: {e}")))?;
    inventory
        .flush()
        .map_err(|e| CliError::Config(format!("flush inventory: {e}")))?;

    debug!(inventory = %inventory.path().display(), playbook = %playbook.display(), "ansible-playbook");

    let status = Command::new("ansible-playbook")
        .arg("-i")
        .arg(inventory.path())
        .arg(&playbook)
        .args(build_extra_vars(profile))
        .env("ANSIBLE_HOST_KEY_CHECKING", "False")
        .status()
        .await?;
    Ok(status.code().unwrap_or(1))
}
