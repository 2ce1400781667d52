use crate::error::{LimaError, Result};

/// Parsed SSH connection info from `limactl show-ssh --format=config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshDetails {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: String,
}

/// Get the current username via `getuid()`.
fn current_username() -> Option<String> {
    let uid = nix::unistd::getuid();
    nix::unistd::User::from_uid(uid).ok().flatten().map(|u| u.name)
}

/// Extract the first value for `field` from SSH-config text.
///
/// SSH config is line-oriented `Key value`; the key must be followed by
/// whitespace, so `Host` never matches a `Hostname` line.
fn parse_field<'a>(config: &'a str, field: &str) -> Option<&'a str> {
    config.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(field)?;
        let rest = rest.strip_prefix(|c: char| c.is_whitespace())?;
        let value = rest.trim();
        if value.is_empty() { None } else { Some(value) }
    })
}

/// Parse the output of `limactl show-ssh --format=config`.
///
/// Host, port, and user fall back to sensible defaults; a missing
/// `IdentityFile` is fatal since Ansible cannot connect without a key.
pub(crate) fn parse_ssh_config(config: &str) -> Result<SshDetails> {
    let host = parse_field(config, "Hostname").unwrap_or("127.0.0.1");
    let port = parse_field(config, "Port")
        .and_then(|p| p.parse().ok())
        .unwrap_or(22);
    let user = parse_field(config, "User")
        .map(str::to_string)
        .or_else(current_username)
        .unwrap_or_else(|| "root".to_string());
    let key = parse_field(config, "IdentityFile")
        .map(|k| k.trim_matches('"').to_string())
        .ok_or(LimaError::MissingIdentityFile)?;

    Ok(SshDetails {
        host: host.to_string(),
        port,
        user,
        key_path: key,
    })
}
