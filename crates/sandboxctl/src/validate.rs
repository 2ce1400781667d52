use std::collections::BTreeSet;
use std::path::Path;

use crate::profile::Profile;

/// Keys the provisioning secrets template consumes.
const KNOWN_SECRET_KEYS: &[&str] = &[
    "AGENT_GATEWAY_PASSWORD",
    "AGENT_GATEWAY_TOKEN",
    "ANTHROPIC_API_KEY",
    "DISCORD_BOT_TOKEN",
    "GEMINI_API_KEY",
    "GH_TOKEN",
    "OPENAI_API_KEY",
    "OPENROUTER_API_KEY",
    "SLACK_BOT_TOKEN",
    "TELEGRAM_BOT_TOKEN",
];

/// Minimum keys for a working sandbox.
const REQUIRED_SECRET_KEYS: &[&str] = &["ANTHROPIC_API_KEY", "GH_TOKEN"];

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run all pre-flight checks, accumulating every finding into one result.
///
/// Pure: reads the secrets file and stats mount paths, nothing else. No
/// subprocesses, no network.
pub fn validate_profile(profile: &Profile) -> ValidationResult {
    let mut result = ValidationResult::default();
    check_paths(profile, &mut result);
    check_secrets(profile, &mut result);
    check_coherence(profile, &mut result);
    result
}

fn check_paths(profile: &Profile, result: &mut ValidationResult) {
    let mount_fields = [
        ("repo", &profile.mounts.repo),
        ("config", &profile.mounts.config),
        ("agent_data", &profile.mounts.agent_data),
        ("buildlog_data", &profile.mounts.buildlog_data),
        ("secrets", &profile.mounts.secrets),
        ("vault", &profile.mounts.vault),
    ];
    for (name, raw) in mount_fields {
        if raw.is_empty() {
            continue;
        }
        if !Path::new(raw).exists() {
            result
                .errors
                .push(format!("mounts.{name}: path does not exist: {raw}"));
        }
    }
}

/// Parse the secrets file as line-oriented `KEY=VALUE` and audit the keys.
fn check_secrets(profile: &Profile, result: &mut ValidationResult) {
    let raw = &profile.mounts.secrets;
    if raw.is_empty() {
        result
            .warnings
            .push("No secrets file configured; VM will have no API keys".to_string());
        return;
    }
    let path = Path::new(raw);
    if !path.exists() {
        // Already reported by the path check; don't duplicate.
        return;
    }
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            result.errors.push(format!("Cannot read secrets file: {e}"));
            return;
        }
    };

    let present: BTreeSet<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.strip_prefix("export ").unwrap_or(line))
        .filter_map(|line| line.split('=').next())
        .map(str::trim)
        .collect();

    let missing_required: Vec<&str> = REQUIRED_SECRET_KEYS
        .iter()
        .filter(|key| !present.contains(**key))
        .copied()
        .collect();
    if !missing_required.is_empty() {
        result.errors.push(format!(
            "Secrets file is missing required keys: {}",
            missing_required.join(", ")
        ));
    }

    let missing_optional: Vec<&str> = KNOWN_SECRET_KEYS
        .iter()
        .filter(|key| !REQUIRED_SECRET_KEYS.contains(key) && !present.contains(**key))
        .copied()
        .collect();
    if !missing_optional.is_empty() {
        result.warnings.push(format!(
            "Secrets file is missing optional keys: {}",
            missing_optional.join(", ")
        ));
    }
}

fn check_coherence(profile: &Profile, result: &mut ValidationResult) {
    if profile.mode.safe_overlay && profile.mode.unsafe_write {
        result
            .errors
            .push("safe_overlay and unsafe_write are mutually exclusive".to_string());
    }

    if profile.mounts.repo.is_empty() {
        result.warnings.push(
            "No repo mount configured; required for new VMs (ignored for existing ones)".to_string(),
        );
    }
}
