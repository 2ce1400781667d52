//! Subcommand entry points. Thin: argument handling and wiring only, the
//! actual sequencing lives in [`crate::orchestrator`].

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Args;
use limavm::{LimaManager, VmSupervisor};

use crate::ansible::AnsibleRunner;
use crate::deps::Brew;
use crate::error::{CliError, CliResult};
use crate::orchestrator;
use crate::paths;
use crate::profile::{self, Profile};
use crate::report;
use crate::validate;

/// Remote exec timeouts are clamped into this range (seconds).
const EXEC_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=600;

#[derive(Args)]
pub struct UpArgs {
    /// Delete any existing VM first and provision from scratch
    #[arg(long)]
    pub fresh: bool,
    /// Enable the graph stack for this run (overrides the profile)
    #[arg(long)]
    pub graph: bool,
}

#[derive(Args)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub force: bool,
}

#[derive(Args)]
pub struct SshArgs {
    /// Command to run in the VM; opens an interactive shell when omitted
    #[arg(trailing_var_arg = true)]
    pub command: Vec<String>,
}

#[derive(Args)]
pub struct ExecArgs {
    /// Timeout in seconds (clamped to 1..=600)
    #[arg(long, default_value_t = limavm::DEFAULT_EXEC_TIMEOUT.as_secs())]
    pub timeout: u64,
    /// Command to run in the VM
    #[arg(required = true, trailing_var_arg = true)]
    pub command: Vec<String>,
}

fn code_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code_byte(code))
}

/// Run validation and print the findings. Returns whether the profile is
/// usable for provisioning.
fn report_validation(profile: &Profile) -> bool {
    let result = validate::validate_profile(profile);
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    for error in &result.errors {
        eprintln!("error: {error}");
    }
    result.ok()
}

/// Load the profile tolerantly: findings print, but a broken profile never
/// blocks the read-style commands that call this.
fn load_tolerant() -> CliResult<Profile> {
    let profile = profile::load()?;
    report_validation(&profile);
    Ok(profile)
}

pub async fn run_up(args: UpArgs) -> CliResult<ExitCode> {
    let mut profile = profile::load()?;
    // Runtime override, applied before validation.
    if args.graph {
        profile.mode.graph = true;
    }
    if !report_validation(&profile) {
        return Ok(ExitCode::FAILURE);
    }
    let assets_dir = paths::find_assets_dir(&profile)?;
    let vm = LimaManager::new();

    if args.fresh {
        println!("Destroying existing VM before reprovisioning...");
        vm.delete(true).await;
    }

    let code = orchestrator::orchestrate_up(
        &profile,
        &assets_dir,
        &Brew,
        &vm,
        &AnsibleRunner,
        &mut io::stdout(),
    )
    .await?;
    Ok(exit_code(code))
}

pub async fn run_down() -> CliResult<ExitCode> {
    load_tolerant()?;
    let vm = LimaManager::new();
    vm.stop(true).await;
    println!("VM stopped.");
    Ok(ExitCode::SUCCESS)
}

pub async fn run_destroy(args: DestroyArgs) -> CliResult<ExitCode> {
    if !args.force {
        print!("This will permanently delete the VM. Type 'yes' to confirm: ");
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if answer.trim() != "yes" {
            println!("Aborted.");
            return Ok(ExitCode::FAILURE);
        }
    }
    load_tolerant()?;
    let vm = LimaManager::new();
    vm.delete(true).await;
    println!("VM deleted.");
    Ok(ExitCode::SUCCESS)
}

pub async fn run_status() -> CliResult<ExitCode> {
    let profile = load_tolerant()?;
    let vm = LimaManager::new();
    let info = vm.info().await;
    report::print_status(&profile, info.as_ref(), &mut io::stdout())?;
    Ok(ExitCode::SUCCESS)
}

/// Replace this process with `limactl shell`. Only returns on exec failure.
pub async fn run_ssh(args: SshArgs) -> CliResult<ExitCode> {
    load_tolerant()?;
    let vm = LimaManager::new();
    if vm.status().await != "Running" {
        eprintln!("VM is not running. Start it with `sandboxctl up`.");
        return Ok(ExitCode::FAILURE);
    }
    let err = if args.command.is_empty() {
        vm.shell()
    } else {
        vm.shell_exec(&args.command.join(" "))
    };
    Err(CliError::Io(err))
}

pub async fn run_exec(args: ExecArgs) -> CliResult<ExitCode> {
    load_tolerant()?;
    let vm = LimaManager::new();
    if vm.status().await != "Running" {
        eprintln!("VM is not running. Start it with `sandboxctl up`.");
        return Ok(ExitCode::FAILURE);
    }
    let timeout = args
        .timeout
        .clamp(*EXEC_TIMEOUT_RANGE.start(), *EXEC_TIMEOUT_RANGE.end());
    let output = vm
        .run(&args.command.join(" "), Duration::from_secs(timeout))
        .await?;
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    stdout.write_all(output.stdout.as_bytes())?;
    stderr.write_all(output.stderr.as_bytes())?;
    Ok(exit_code(output.exit_code))
}
