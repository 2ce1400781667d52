//! Fail-fast provisioning sequence behind `sandboxctl up`.
//!
//! A single linear pass over numbered gates, run fresh on every invocation.
//! Each fatal gate either passes or ends the run with an exit code and a
//! message naming what to fix. The only non-fatal steps are the collection
//! install inside gate 1 and the vault sync.

use std::io::Write;
use std::path::Path;

use limavm::{SshDetails, VmSupervisor};
use tracing::{info, warn};

use crate::ansible::ProvisionRunner;
use crate::deps::HostDeps;
use crate::error::CliResult;
use crate::profile::Profile;
use crate::report;
use crate::vm_config;

/// Guest-side overlay upper directory that serves the vault copy.
const VAULT_OVERLAY_UPPER: &str = "/var/lib/agent-sandbox/overlay/vault/upper/";

/// Run the full bring-up: host deps, config, boot, mount verification,
/// provisioning, vault sync, report. Returns the process exit code.
pub async fn orchestrate_up<D, S, R, W>(
    profile: &Profile,
    assets_dir: &Path,
    deps: &D,
    vm: &S,
    runner: &R,
    out: &mut W,
) -> CliResult<i32>
where
    D: HostDeps + ?Sized,
    S: VmSupervisor + ?Sized,
    R: ProvisionRunner + ?Sized,
    W: Write,
{
    // Gate 1: host tooling.
    writeln!(out, "Checking dependencies...")?;
    if let Err(e) = deps.check_package_manager() {
        writeln!(out, "Error: {e}")?;
        return Ok(1);
    }
    let bundle_code = deps.install_bundle(assets_dir).await?;
    if bundle_code != 0 {
        writeln!(out, "Error: brew bundle failed.")?;
        return Ok(bundle_code);
    }
    let collections_code = deps.install_collections(assets_dir).await?;
    if collections_code != 0 {
        // Collections may already be installed.
        writeln!(out, "Warning: ansible-galaxy install had warnings (continuing).")?;
    }

    // Gate 2: VM config. An already-existing VM keeps the config it booted
    // with; regenerating would silently diverge from the running topology.
    let config_path = if vm.exists().await {
        writeln!(
            out,
            "VM '{}' already exists, using existing configuration.",
            vm.vm_name()
        )?;
        if !profile.mounts.repo.is_empty() {
            writeln!(
                out,
                "Warning: path options only apply to new VMs. \
                 To change paths: sandboxctl destroy -f && sandboxctl up"
            )?;
        }
        vm_config::config_path(assets_dir, vm.vm_name())
    } else {
        if profile.mounts.repo.is_empty() {
            writeln!(
                out,
                "Error: a repo mount is required to create a new VM.\n\
                 Set mounts.repo in your profile."
            )?;
            return Ok(1);
        }
        writeln!(out, "Generating VM configuration...")?;
        let path = vm_config::write_config(profile, assets_dir, vm.vm_name())?;
        let context = vm_config::build_context(profile, assets_dir)?;
        report::print_mount_table(&context, profile, out)?;
        path
    };

    // Gate 3: boot.
    writeln!(out, "Ensuring VM is running...")?;
    match vm.ensure_running(&config_path).await {
        Ok(created) => {
            if created {
                info!(vm = vm.vm_name(), "created");
                writeln!(out, "Created and started VM.")?;
            } else {
                writeln!(out, "VM is running.")?;
            }
        }
        Err(e) => {
            writeln!(out, "Error: failed to start VM: {e}")?;
            return Ok(1);
        }
    }

    // Gate 4: mount verification. Check every mount before failing so one
    // run reports the complete set of problems.
    writeln!(out, "Verifying host mounts...")?;
    let context = vm_config::build_context(profile, assets_dir)?;
    let mut failed = false;
    for mount in &context.mounts {
        if vm.verify_mount(&mount.mount_point).await {
            writeln!(out, "  {} OK", mount.mount_point)?;
        } else {
            writeln!(out, "  {} MISSING", mount.mount_point)?;
            failed = true;
        }
    }
    if failed {
        writeln!(out, "Error: some mounts are not accessible. Check the VM configuration.")?;
        return Ok(1);
    }
    writeln!(out, "All mounts verified.")?;

    // Gate 5: provision over SSH.
    writeln!(out, "Running provisioning playbook...")?;
    let ssh = match vm.ssh_details().await {
        Ok(ssh) => ssh,
        Err(e) => {
            writeln!(out, "Error: could not resolve SSH details: {e}")?;
            return Ok(1);
        }
    };
    writeln!(out, "SSH: {}@{}:{}", ssh.user, ssh.host, ssh.port)?;
    let play_code = runner.provision(profile, &ssh, assets_dir, vm.vm_name()).await?;
    if play_code != 0 {
        writeln!(out, "Error: provisioning failed (exit {play_code}).")?;
        return Ok(play_code);
    }

    // Gate 6: best-effort vault sync; never changes the exit code.
    if !profile.mounts.vault.is_empty() && !profile.mode.unsafe_write {
        sync_vault(profile, &ssh, runner, out).await?;
    }

    // Gate 7: report.
    report::print_post_up(profile, vm.vm_name(), out)?;
    Ok(0)
}

/// Rsync the host vault directory into the VM's overlay upper dir.
///
/// Cloud-sync file locks on the host can make the vault unreadable through
/// the virtiofs mount, so a copy over SSH serves the files instead. Failure
/// is reported with a manual-recovery command and never blocks the caller.
pub async fn sync_vault<R, W>(
    profile: &Profile,
    ssh: &SshDetails,
    runner: &R,
    out: &mut W,
) -> CliResult<()>
where
    R: ProvisionRunner + ?Sized,
    W: Write,
{
    let vault = crate::paths::resolve(Path::new(&profile.mounts.vault));
    if !vault.is_dir() {
        writeln!(out, "Warning: vault path does not exist: {}", vault.display())?;
        return Ok(());
    }

    let remote_shell = format!(
        "ssh -p {} -i {} -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null",
        ssh.port, ssh.key_path
    );
    let source = format!("{}/", vault.display());
    let target = format!("{}@{}:{}", ssh.user, ssh.host, VAULT_OVERLAY_UPPER);

    writeln!(out, "Syncing vault into VM overlay...")?;
    if runner.copy_to_vm(&source, &target, &remote_shell).await {
        writeln!(out, "Vault synced.")?;
    } else {
        warn!("vault sync failed");
        writeln!(out, "Warning: vault sync failed. Recover manually with:")?;
        writeln!(out, "  rsync -a -e \"{remote_shell}\" {source} {target}")?;
    }
    Ok(())
}
