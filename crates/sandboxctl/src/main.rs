mod ansible;
mod cmd;
mod deps;
mod error;
mod orchestrator;
mod paths;
mod profile;
mod report;
mod validate;
mod vm_config;

use std::fmt;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser)]
#[command(name = "sandboxctl", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create, start, and provision the sandbox VM
    Up(cmd::UpArgs),
    /// Stop the sandbox VM
    Down,
    /// Delete the VM and its disk
    Destroy(cmd::DestroyArgs),
    /// Show VM state and the active profile
    Status,
    /// Open an interactive shell (or run a command) in the VM
    Ssh(cmd::SshArgs),
    /// Run a command in the VM with captured output and a timeout
    Exec(cmd::ExecArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Up(args) => cmd::run_up(args).await,
        Command::Down => cmd::run_down().await,
        Command::Destroy(args) => cmd::run_destroy(args).await,
        Command::Status => cmd::run_status().await,
        Command::Ssh(args) => cmd::run_ssh(args).await,
        Command::Exec(args) => cmd::run_exec(args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
