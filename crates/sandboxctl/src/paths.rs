use std::path::{Path, PathBuf};

use crate::error::{CliError, CliResult};
use crate::profile::Profile;

/// Environment variable pointing at the provisioning assets checkout.
pub const ASSETS_DIR_ENV: &str = "SANDBOXCTL_ASSETS_DIR";

/// Marker file identifying a provisioning assets directory.
const ASSETS_MARKER: &str = "ansible/playbook.yml";

pub fn home_dir() -> CliResult<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| CliError::Config("HOME is not set".into()))
}

/// Expand a leading `~` to the user's home directory.
///
/// Returns the input unchanged when it has no tilde prefix or when HOME
/// is unavailable.
pub fn expand_user(raw: &str) -> String {
    if raw == "~"
        && let Ok(home) = home_dir()
    {
        return home.display().to_string();
    }
    if let Some(rest) = raw.strip_prefix("~/")
        && let Ok(home) = home_dir()
    {
        return home.join(rest).display().to_string();
    }
    raw.to_string()
}

/// Canonicalize when possible, falling back to the unresolved path.
pub fn resolve(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Location of the profile store: `~/.sandboxctl/profile.yaml`.
pub fn profile_path() -> CliResult<PathBuf> {
    Ok(home_dir()?.join(".sandboxctl").join("profile.yaml"))
}

/// Locate the provisioning assets directory via CWD, then
/// `$SANDBOXCTL_ASSETS_DIR`, then the profile's `meta.assets_dir`.
pub fn find_assets_dir(profile: &Profile) -> CliResult<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd);
    }
    if let Some(env_dir) = std::env::var_os(ASSETS_DIR_ENV) {
        candidates.push(PathBuf::from(env_dir));
    }
    if !profile.meta.assets_dir.is_empty() {
        candidates.push(PathBuf::from(&profile.meta.assets_dir));
    }

    for candidate in candidates {
        if candidate.join(ASSETS_MARKER).is_file() {
            return Ok(candidate);
        }
    }
    Err(CliError::Config(format!(
        "cannot find provisioning assets ({ASSETS_MARKER}): run from the assets repo, \
         set ${ASSETS_DIR_ENV}, or configure meta.assets_dir in your profile"
    )))
}
