use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::ssh::SshDetails;
use crate::types::{ExecOutput, VmRecord};

/// VM lifecycle operations as seen by the orchestrator.
///
/// `LimaManager` is the real implementation; tests drive the orchestration
/// sequence with a scripted fake instead of a live `limactl`.
#[async_trait]
pub trait VmSupervisor: Send + Sync {
    fn vm_name(&self) -> &str;

    // -- queries --
    async fn exists(&self) -> bool;
    /// Status string as reported by the VM manager (`Running`, `Stopped`, ...)
    /// or `unknown` when the VM is absent or the query fails.
    async fn status(&self) -> String;
    async fn info(&self) -> Option<VmRecord>;

    // -- lifecycle --
    async fn create(&self, config_path: &Path) -> Result<()>;
    async fn start(&self) -> Result<()>;
    /// Best-effort stop; failures are swallowed.
    async fn stop(&self, force: bool);
    /// Best-effort delete. Always force-stops first, ignoring that outcome.
    async fn delete(&self, force: bool);

    // -- operations --
    async fn ssh_details(&self) -> Result<SshDetails>;
    async fn run(&self, command: &str, timeout: Duration) -> Result<ExecOutput>;
    /// `true` if `mount_point` is an accessible directory inside the VM.
    /// Any remote failure reports `false`, never an error.
    async fn verify_mount(&self, mount_point: &str) -> bool;

    /// Create the VM if absent, then start it if not running.
    /// Returns `true` if the VM was created by this call.
    async fn ensure_running(&self, config_path: &Path) -> Result<bool> {
        let mut created = false;
        if !self.exists().await {
            self.create(config_path).await?;
            created = true;
        }
        if self.status().await != "Running" {
            self.start().await?;
        }
        Ok(created)
    }
}
