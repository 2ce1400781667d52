use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::command::{exec, exec_ignore_errors, exec_passthrough};
use crate::error::{LimaError, Result};
use crate::ssh::{SshDetails, parse_ssh_config};
use crate::supervisor::VmSupervisor;
use crate::types::{ExecOutput, VmRecord};

pub const VM_NAME: &str = "agent-sandbox";

/// Default bound on remote command execution.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(120);

/// Thin wrapper around `limactl` for VM lifecycle operations.
pub struct LimaManager {
    vm_name: String,
}

impl Default for LimaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LimaManager {
    pub fn new() -> Self {
        Self::with_name(VM_NAME)
    }

    pub fn with_name(vm_name: &str) -> Self {
        Self {
            vm_name: vm_name.to_string(),
        }
    }

    /// Scan `limactl list --json` output for this VM's record.
    ///
    /// Lima prints one JSON object per line; malformed lines are skipped.
    async fn find_record(&self) -> Option<VmRecord> {
        let stdout = exec("limactl", &["list", "--json"]).await.ok()?;
        stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<VmRecord>(line).ok())
            .find(|r| r.name.as_deref() == Some(self.vm_name.as_str()))
    }

    /// Replace the current process with an interactive VM shell (TTY).
    ///
    /// Only returns if the exec itself fails.
    pub fn shell(&self) -> std::io::Error {
        use std::os::unix::process::CommandExt;
        std::process::Command::new("limactl")
            .args(["shell", &self.vm_name])
            .exec()
    }

    /// Replace the current process, running `command` inside the VM.
    pub fn shell_exec(&self, command: &str) -> std::io::Error {
        use std::os::unix::process::CommandExt;
        std::process::Command::new("limactl")
            .args(["shell", &self.vm_name, "--", "bash", "-c", command])
            .exec()
    }
}

#[async_trait]
impl VmSupervisor for LimaManager {
    fn vm_name(&self) -> &str {
        &self.vm_name
    }

    async fn exists(&self) -> bool {
        self.find_record().await.is_some()
    }

    async fn status(&self) -> String {
        self.find_record()
            .await
            .and_then(|r| r.status)
            .unwrap_or_else(|| "unknown".to_string())
    }

    async fn info(&self) -> Option<VmRecord> {
        self.find_record().await
    }

    async fn create(&self, config_path: &Path) -> Result<()> {
        let name_flag = format!("--name={}", self.vm_name);
        let path = config_path.display().to_string();
        exec_passthrough("limactl", &["create", &name_flag, &path]).await?;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        exec_passthrough("limactl", &["start", &self.vm_name]).await?;
        Ok(())
    }

    async fn stop(&self, force: bool) {
        if force {
            exec_ignore_errors("limactl", &["stop", "--force", &self.vm_name]).await;
        } else {
            exec_ignore_errors("limactl", &["stop", &self.vm_name]).await;
        }
    }

    async fn delete(&self, force: bool) {
        // A running VM cannot be deleted; the stop outcome is irrelevant.
        exec_ignore_errors("limactl", &["stop", "--force", &self.vm_name]).await;
        if force {
            exec_ignore_errors("limactl", &["delete", "--force", &self.vm_name]).await;
        } else {
            exec_ignore_errors("limactl", &["delete", &self.vm_name]).await;
        }
    }

    async fn ssh_details(&self) -> Result<SshDetails> {
        let config = exec("limactl", &["show-ssh", "--format=config", &self.vm_name]).await?;
        parse_ssh_config(&config)
    }

    async fn run(&self, command: &str, timeout: Duration) -> Result<ExecOutput> {
        let child = Command::new("limactl")
            .args(["shell", &self.vm_name, "--", "bash", "-c", command])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ExecOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code().unwrap_or(-1),
            }),
            Ok(Err(e)) => Err(LimaError::Io(e)),
            // Dropping the output future kills the child (kill_on_drop).
            Err(_) => Err(LimaError::Timeout(timeout.as_secs())),
        }
    }

    async fn verify_mount(&self, mount_point: &str) -> bool {
        exec(
            "limactl",
            &["shell", &self.vm_name, "--", "test", "-d", mount_point],
        )
        .await
        .is_ok()
    }
}
