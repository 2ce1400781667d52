use serde::Deserialize;

/// One record from `limactl list --json` (one JSON object per line, not an
/// array). Every field is optional so a malformed or partial record never
/// aborts the scan.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VmRecord {
    pub name: Option<String>,
    pub status: Option<String>,
    pub arch: Option<String>,
    pub cpus: Option<u32>,
    pub memory: Option<u64>,
    pub disk: Option<u64>,
}

/// Captured result of a command run inside the VM.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}
