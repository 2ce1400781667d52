//! User-facing report text. Every function takes an explicit output sink so
//! nothing writes through ambient global state and tests can capture output.

use std::io::{self, Write};

use limavm::VmRecord;

use crate::profile::Profile;
use crate::vm_config::{GATEWAY_PORT, VmConfigContext};

/// Log the resolved mount table after config generation.
pub fn print_mount_table<W: Write>(
    context: &VmConfigContext,
    profile: &Profile,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "Mounts:")?;
    for mount in &context.mounts {
        let mut mode = if mount.writable { "read-write" } else { "read-only" }.to_string();
        if !profile.mode.unsafe_write && mount.mount_point == "/mnt/repo" {
            mode.push_str(" + overlay");
        }
        writeln!(
            out,
            "  {:<25} -> {} ({mode})",
            mount.mount_point,
            mount.location.display()
        )?;
    }
    Ok(())
}

/// Completion summary after a successful provision.
pub fn print_post_up<W: Write>(profile: &Profile, vm_name: &str, out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Provisioning complete!")?;
    writeln!(out)?;
    writeln!(out, "VM '{vm_name}' is running.")?;
    writeln!(out, "Access via:  sandboxctl ssh")?;
    writeln!(out, "Stop with:   sandboxctl down")?;
    writeln!(out, "Delete with: sandboxctl destroy")?;

    if !profile.mounts.vault.is_empty() {
        writeln!(out)?;
        writeln!(out, "Vault mounted at: /mnt/vault")?;
    }

    writeln!(out)?;
    if profile.mode.unsafe_write {
        writeln!(out, "UNSAFE-WRITE mode: no overlay, host mounts are writable.")?;
        writeln!(out, "Agent writes go DIRECTLY to the host filesystem.")?;
    } else if profile.mode.safe_overlay {
        writeln!(out, "Safe overlay mode: overlay active + auto-sync every 30s.")?;
    } else {
        writeln!(out, "Secure mode: overlay active, host mounts are READ-ONLY.")?;
        writeln!(out, "Services run from: /workspace")?;
    }

    writeln!(out)?;
    writeln!(out, "Gateway: http://127.0.0.1:{GATEWAY_PORT}")?;
    Ok(())
}

/// VM state and profile summary for `sandboxctl status`.
pub fn print_status<W: Write>(
    profile: &Profile,
    info: Option<&VmRecord>,
    out: &mut W,
) -> io::Result<()> {
    match info {
        Some(record) => {
            writeln!(
                out,
                "VM:        {} ({})",
                record.name.as_deref().unwrap_or("?"),
                record.status.as_deref().unwrap_or("unknown")
            )?;
            if let Some(arch) = &record.arch {
                writeln!(out, "Arch:      {arch}")?;
            }
            if let Some(cpus) = record.cpus {
                writeln!(out, "CPUs:      {cpus}")?;
            }
            if let Some(memory) = record.memory {
                writeln!(out, "Memory:    {memory}")?;
            }
            if let Some(disk) = record.disk {
                writeln!(out, "Disk:      {disk}")?;
            }
        }
        None => writeln!(out, "VM:        not found")?,
    }

    let or_unset = |s: &str| {
        if s.is_empty() { "(not set)".to_string() } else { s.to_string() }
    };
    writeln!(out)?;
    writeln!(out, "Assets dir:   {}", or_unset(&profile.meta.assets_dir))?;
    writeln!(out, "Repo mount:   {}", or_unset(&profile.mounts.repo))?;
    writeln!(out, "Secrets:      {}", or_unset(&profile.mounts.secrets))?;
    writeln!(out, "Vault:        {}", or_unset(&profile.mounts.vault))?;
    writeln!(out, "Safe overlay: {}", profile.mode.safe_overlay)?;
    writeln!(out, "Docker:       {}", !profile.mode.no_docker)?;
    writeln!(out, "Graph:        {}", profile.mode.graph)?;
    writeln!(
        out,
        "Resources:    {} CPUs / {} / {}",
        profile.resources.cpus, profile.resources.memory, profile.resources.disk
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Mode, Mounts};
    use crate::vm_config::{MountSpec, PortForwardSpec};

    fn context() -> VmConfigContext {
        VmConfigContext {
            cpus: 4,
            memory: "8GiB".into(),
            disk: "50GiB".into(),
            mounts: vec![
                MountSpec {
                    mount_point: "/mnt/repo".into(),
                    location: "/home/alice/agent".into(),
                    writable: false,
                },
                MountSpec {
                    mount_point: "/mnt/provision".into(),
                    location: "/home/alice/assets".into(),
                    writable: false,
                },
            ],
            port_forwards: vec![PortForwardSpec {
                guest_port: GATEWAY_PORT,
                host_port: GATEWAY_PORT,
                proto: "tcp",
            }],
        }
    }

    fn capture(f: impl FnOnce(&mut Vec<u8>)) -> String {
        let mut buf = Vec::new();
        f(&mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn mount_table_marks_overlay_on_repo() {
        let text = capture(|out| {
            print_mount_table(&context(), &Profile::default(), out).unwrap();
        });
        assert!(text.contains("/mnt/repo"));
        assert!(text.contains("read-only + overlay"));
        assert!(text.contains("/mnt/provision"));
    }

    #[test]
    fn mount_table_no_overlay_in_unsafe_write() {
        let profile = Profile {
            mode: Mode {
                unsafe_write: true,
                ..Mode::default()
            },
            ..Profile::default()
        };
        let text = capture(|out| {
            print_mount_table(&context(), &profile, out).unwrap();
        });
        assert!(!text.contains("overlay"));
    }

    #[test]
    fn post_up_mode_messages() {
        let secure = capture(|out| {
            print_post_up(&Profile::default(), "agent-sandbox", out).unwrap();
        });
        assert!(secure.contains("Secure mode"));
        assert!(secure.contains("agent-sandbox"));

        let unsafe_profile = Profile {
            mode: Mode {
                unsafe_write: true,
                ..Mode::default()
            },
            ..Profile::default()
        };
        let text = capture(|out| {
            print_post_up(&unsafe_profile, "agent-sandbox", out).unwrap();
        });
        assert!(text.contains("UNSAFE-WRITE mode"));
    }

    #[test]
    fn status_reports_absent_vm() {
        let text = capture(|out| {
            print_status(&Profile::default(), None, out).unwrap();
        });
        assert!(text.contains("not found"));
        assert!(text.contains("(not set)"));
    }

    #[test]
    fn status_reports_vm_record_fields() {
        let record = VmRecord {
            name: Some("agent-sandbox".into()),
            status: Some("Running".into()),
            arch: Some("aarch64".into()),
            cpus: Some(4),
            ..VmRecord::default()
        };
        let profile = Profile {
            mounts: Mounts {
                vault: "/v".into(),
                ..Mounts::default()
            },
            ..Profile::default()
        };
        let text = capture(|out| {
            print_status(&profile, Some(&record), out).unwrap();
        });
        assert!(text.contains("agent-sandbox (Running)"));
        assert!(text.contains("aarch64"));
        assert!(text.contains("Vault:        /v"));
    }
}
