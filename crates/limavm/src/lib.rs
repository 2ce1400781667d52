//! Wrapper around the `limactl` CLI for VM lifecycle management.
//!
//! Everything goes through subprocess invocations; there is no persistent
//! connection to the VM. `LimaManager` is the real implementation; the
//! `VmSupervisor` trait exists so orchestration code can be tested against
//! a scripted fake.

mod command;
mod error;
mod manager;
mod ssh;
mod supervisor;
mod types;

pub use command::CommandError;
pub use error::{LimaError, Result};
pub use manager::{DEFAULT_EXEC_TIMEOUT, LimaManager, VM_NAME};
pub use ssh::SshDetails;
pub use supervisor::VmSupervisor;
pub use types::{ExecOutput, VmRecord};
