use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::error::{CliError, CliResult};

/// Host-side tooling installation, as seen by the orchestrator.
///
/// `Brew` is the real implementation; orchestration tests substitute a fake
/// so no package manager runs.
#[async_trait]
pub trait HostDeps: Send + Sync {
    /// Verify the package manager exists. Error text includes install steps.
    fn check_package_manager(&self) -> CliResult<()>;
    /// Install the declared bundle. Returns the tool's exit code.
    async fn install_bundle(&self, assets_dir: &Path) -> CliResult<i32>;
    /// Install provisioning-engine collections. Returns the tool's exit code.
    async fn install_collections(&self, assets_dir: &Path) -> CliResult<i32>;
}

pub struct Brew;

#[async_trait]
impl HostDeps for Brew {
    fn check_package_manager(&self) -> CliResult<()> {
        check_brew()
    }

    async fn install_bundle(&self, assets_dir: &Path) -> CliResult<i32> {
        install_brew_deps(assets_dir).await
    }

    async fn install_collections(&self, assets_dir: &Path) -> CliResult<i32> {
        install_galaxy_collections(assets_dir).await
    }
}

/// Verify Homebrew is on PATH.
pub fn check_brew() -> CliResult<()> {
    if which::which("brew").is_err() {
        return Err(CliError::Dependency(
            "Homebrew is not installed.\n\
             Install it from https://brew.sh or run:\n  \
             /bin/bash -c \"$(curl -fsSL \
             https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh)\""
                .to_string(),
        ));
    }
    Ok(())
}

/// Run `brew bundle` against the assets Brewfile. Returns the exit code.
pub async fn install_brew_deps(assets_dir: &Path) -> CliResult<i32> {
    let brewfile = assets_dir.join("brew").join("Brewfile");
    if !brewfile.is_file() {
        warn!("Brewfile not found at {}", brewfile.display());
        return Ok(1);
    }
    let file_flag = format!("--file={}", brewfile.display());
    let status = Command::new("brew")
        .args(["bundle", &file_flag])
        .status()
        .await?;
    Ok(status.code().unwrap_or(1))
}

/// Install provisioning-engine collections from `ansible/requirements.yml`.
///
/// An absent requirements file means nothing to do. Callers treat a non-zero
/// exit as a warning: the collections may already be installed.
pub async fn install_galaxy_collections(assets_dir: &Path) -> CliResult<i32> {
    let requirements = assets_dir.join("ansible").join("requirements.yml");
    if !requirements.is_file() {
        return Ok(0);
    }
    let req_path = requirements.display().to_string();
    let status = Command::new("ansible-galaxy")
        .args(["collection", "install", "-r", &req_path, "--force-with-deps"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    Ok(status.code().unwrap_or(1))
}
