//! `validate_bash_input` (§4.2): parse a compound shell command into
//! segments, classify each segment's risk, and gate on the caller's
//! autonomy configuration.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use gateway_core::config::{AutonomyConfig, AutonomyLevel};

use crate::allowlist::is_baseline_allowed;

/// Decoded `{command, approved?}` tool argument shape.
#[derive(Debug, Clone, Deserialize)]
pub struct BashInput {
    pub command: String,
    #[serde(default)]
    pub approved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Risk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("command is required")]
    Empty,
    #[error("shell injection sigil is not permitted: {0}")]
    InjectionSigil(&'static str),
    #[error("command not in allow-list: {0}")]
    NotAllowed(String),
    #[error("blocked: high-risk command")]
    HighRisk,
    #[error("requires approval")]
    RequiresApproval,
    #[error("blocked: autonomy level is read-only")]
    ReadOnly,
    #[error("blocked: path escapes the workspace")]
    WorkspaceOnly,
}

const SEGMENT_SEPARATORS: &[&str] = &["&&", "||", ";", "|", "\n"];

const INJECTION_SIGILS: &[&str] = &["`", "$(", "${"];

const HIGH_RISK_COMMANDS: &[&str] = &[
    "rm", "mkfs", "dd", "shutdown", "reboot", "halt", "poweroff", "sudo", "su", "chown", "chmod",
    "useradd", "userdel", "usermod", "passwd", "mount", "umount", "iptables", "ufw",
    "firewall-cmd", "curl", "wget", "nc", "ncat", "netcat", "scp", "ssh", "ftp", "telnet",
];

const HIGH_RISK_PATTERNS: &[&str] = &["rm -rf /", "rm -fr /", ":(){ :|:& };:"];

const MEDIUM_RISK_GIT_SUBCOMMANDS: &[&str] = &[
    "commit", "push", "reset", "clean", "rebase", "merge", "cherry-pick", "revert", "branch",
    "checkout",
];

/// Run the full §4.2 pipeline against `input`. `extra_allowed` are
/// user-configured commands merged into the baseline allow-list.
pub fn validate_bash_input(
    input: &BashInput,
    autonomy: &AutonomyConfig,
    extra_allowed: &[String],
) -> Result<(), PolicyError> {
    let command = input.command.trim();
    if command.is_empty() {
        return Err(PolicyError::Empty);
    }

    for sigil in INJECTION_SIGILS {
        if command.contains(sigil) {
            return Err(PolicyError::InjectionSigil(sigil));
        }
    }

    let segments = split_segments(command);
    if segments.is_empty() {
        return Err(PolicyError::Empty);
    }

    let mut highest = Risk::Low;
    for segment in &segments {
        let base = base_command(segment);
        if base.is_empty() {
            return Err(PolicyError::Empty);
        }
        if !is_baseline_allowed(&base) && !extra_allowed.iter().any(|c| c == &base) {
            return Err(PolicyError::NotAllowed(base));
        }
        let risk = classify_risk(segment, &base);
        debug!(segment, base_command = %base, ?risk, "classified segment");
        highest = highest.max(risk);
    }

    if autonomy.block_high_risk && highest == Risk::High {
        return Err(PolicyError::HighRisk);
    }
    if autonomy.level == AutonomyLevel::Supervised && highest == Risk::Medium && !input.approved {
        return Err(PolicyError::RequiresApproval);
    }
    if autonomy.level == AutonomyLevel::Readonly {
        return Err(PolicyError::ReadOnly);
    }
    if autonomy.workspace_only && has_escaping_path(command) {
        return Err(PolicyError::WorkspaceOnly);
    }

    Ok(())
}

fn split_segments(command: &str) -> Vec<String> {
    let mut pieces = vec![command.to_string()];
    for sep in SEGMENT_SEPARATORS {
        pieces = pieces
            .into_iter()
            .flat_map(|p| p.split(sep).map(str::to_string).collect::<Vec<_>>())
            .collect();
    }
    pieces
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// First whitespace-separated token of a segment, stripped of leading
/// `VAR=value` assignments and any directory prefix (the basename wins).
fn base_command(segment: &str) -> String {
    let mut tokens = segment.split_whitespace();
    let mut token = tokens.next().unwrap_or("");
    while is_assignment(token) {
        token = match tokens.next() {
            Some(t) => t,
            None => return String::new(),
        };
    }
    token.rsplit('/').next().unwrap_or(token).to_string()
}

fn is_assignment(token: &str) -> bool {
    match token.find('=') {
        Some(0) => false,
        Some(idx) => token[..idx].chars().all(|c| c.is_alphanumeric() || c == '_'),
        None => false,
    }
}

fn classify_risk(segment: &str, base: &str) -> Risk {
    let lower = segment.to_lowercase();
    for pattern in HIGH_RISK_PATTERNS {
        if lower.contains(pattern) {
            return Risk::High;
        }
    }
    if HIGH_RISK_COMMANDS.contains(&base) {
        return Risk::High;
    }
    if base == "git" {
        if let Some(sub) = segment.split_whitespace().nth(1) {
            if MEDIUM_RISK_GIT_SUBCOMMANDS.contains(&sub) {
                return Risk::Medium;
            }
        }
        return Risk::Low;
    }
    if (base == "npm" && segment.contains("publish")) || (base == "cargo" && segment.contains("publish"))
    {
        return Risk::Medium;
    }
    Risk::Low
}

fn has_escaping_path(command: &str) -> bool {
    command
        .split_whitespace()
        .any(|tok| tok.starts_with('/') || tok.starts_with("~/"))
}
