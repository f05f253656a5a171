// src/sys/parsers.rs
//
// Small tokenizers, one per remote output format. Absent or unreadable fields
// resolve to `Missing`/`None` or a documented fallback; nothing here panics
// or returns an error on strange input.

use std::net::Ipv4Addr;

use crate::models::{
    Fail2banState, FirewallAction, FirewallRule, FirewallStatus, Protocol, SecureAuditResult,
    SettingStatus, SshdSetting,
};
use crate::sys::commands::{SECTION_SEPARATOR, SSH_PORT, STEP_MARKER};

/// Highest MaxAuthTries still considered hardened.
const MAX_AUTH_TRIES_SECURE: u32 = 5;

// ==============================================================================
// 1. Step Progress
// ==============================================================================

/// Counts completed steps of a rendered `RemoteScript` and returns the
/// output with the progress markers removed.
pub fn parse_step_progress(stdout: &str) -> (usize, String) {
    let mut completed = 0;
    let mut cleaned = Vec::new();
    for line in stdout.lines() {
        match line.trim().strip_prefix(STEP_MARKER) {
            Some(n) => {
                if let Ok(n) = n.trim().parse::<usize>() {
                    completed = completed.max(n);
                }
            }
            None => cleaned.push(line),
        }
    }
    (completed, cleaned.join("\n"))
}

// ==============================================================================
// 2. UFW Status
// ==============================================================================

/// Parses `ufw status numbered`. No `Status: active` line means inactive, no rules.
pub fn parse_ufw_status(output: &str) -> FirewallStatus {
    let active = output
        .lines()
        .any(|l| l.trim().eq_ignore_ascii_case("status: active"));
    if !active {
        return FirewallStatus::default();
    }

    let rules = output.lines().flat_map(parse_ufw_rule_line).collect();
    FirewallStatus { active, rules }
}

/// Grammar: `[ N]`? PORT[:PORT][/PROTO] `(v6)`? ACTION DIRECTION? FROM...
fn parse_ufw_rule_line(line: &str) -> Vec<FirewallRule> {
    let mut rest = line.trim();
    if let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(end) => rest = stripped[end + 1..].trim_start(),
            None => return Vec::new(),
        }
    }

    let mut tokens = rest.split_whitespace().peekable();
    let Some(target) = tokens.next() else {
        return Vec::new();
    };
    let (port, protocols) = match target.split_once('/') {
        Some((port, proto)) => match proto.parse::<Protocol>() {
            Ok(p) => (port, vec![p]),
            Err(_) => return Vec::new(),
        },
        None => (target, vec![Protocol::Tcp, Protocol::Udp]),
    };
    let (port, port_end) = match port.split_once(':') {
        Some((first, last)) => match (first.parse::<u16>(), last.parse::<u16>()) {
            (Ok(first), Ok(last)) if first <= last => (first, Some(last)),
            _ => return Vec::new(),
        },
        None => match port.parse::<u16>() {
            Ok(port) => (port, None),
            Err(_) => return Vec::new(),
        },
    };

    if tokens.peek() == Some(&"(v6)") {
        tokens.next();
    }

    let action = match tokens.next().map(str::to_ascii_uppercase).as_deref() {
        Some("ALLOW") | Some("LIMIT") => FirewallAction::Allow,
        Some("DENY") | Some("REJECT") => FirewallAction::Deny,
        _ => return Vec::new(),
    };

    match tokens.peek().copied() {
        Some("OUT") | Some("FWD") => return Vec::new(),
        Some("IN") => {
            tokens.next();
        }
        _ => {}
    }

    let from = tokens.collect::<Vec<_>>().join(" ");
    let from = if from.is_empty() { "Anywhere".to_string() } else { from };

    protocols
        .into_iter()
        .map(|protocol| FirewallRule {
            port,
            port_end,
            protocol,
            action,
            from: from.clone(),
        })
        .collect()
}

// ==============================================================================
// 3. SSHD Audit
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityChecks {
    pub password_auth_disabled: bool,
    pub root_login_key_only: bool,
    pub fail2ban_active: bool,
    pub ssh_port_changed: bool,
}

/// 25 points per satisfied check.
pub fn calculate_security_score(checks: &SecurityChecks) -> u8 {
    [
        checks.password_auth_disabled,
        checks.root_login_key_only,
        checks.fail2ban_active,
        checks.ssh_port_changed,
    ]
    .iter()
    .filter(|c| **c)
    .count() as u8
        * 25
}

/// First occurrence of `key` (case-insensitive), as sshd itself resolves duplicates.
fn sshd_value<'a>(config: &'a str, key: &str) -> Option<&'a str> {
    config.lines().find_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (k, v) = line.split_once(char::is_whitespace)?;
        k.eq_ignore_ascii_case(key).then(|| v.trim())
    })
}

fn classify(key: &str, value: Option<&str>) -> SshdSetting {
    let status = match value.map(str::to_ascii_lowercase) {
        None => SettingStatus::Missing,
        Some(v) => match key {
            "PasswordAuthentication" => match v.as_str() {
                "no" => SettingStatus::Secure,
                _ => SettingStatus::Insecure,
            },
            "PermitRootLogin" => match v.as_str() {
                "no" | "prohibit-password" | "without-password" | "forced-commands-only" => {
                    SettingStatus::Secure
                }
                _ => SettingStatus::Insecure,
            },
            "PubkeyAuthentication" => match v.as_str() {
                "yes" => SettingStatus::Secure,
                _ => SettingStatus::Insecure,
            },
            "MaxAuthTries" => match v.parse::<u32>() {
                Ok(n) if n <= MAX_AUTH_TRIES_SECURE => SettingStatus::Secure,
                Ok(_) => SettingStatus::Insecure,
                Err(_) => SettingStatus::Missing,
            },
            _ => SettingStatus::Missing,
        },
    };
    SshdSetting {
        key: key.to_string(),
        value: value.map(str::to_string),
        status,
    }
}

/// SSH port from the config; 22 when absent or unparsable.
pub fn parse_ssh_port(config: &str) -> u16 {
    sshd_value(config, "Port")
        .and_then(|v| v.parse::<u16>().ok())
        .filter(|p| *p != 0)
        .unwrap_or(SSH_PORT)
}

/// Parses the three separator-delimited sections produced by `commands::secure_audit`.
pub fn parse_secure_audit(output: &str) -> SecureAuditResult {
    let mut sections = output.split(SECTION_SEPARATOR);
    let config = sections.next().unwrap_or_default();
    let service_state = sections.next().unwrap_or_default().trim();
    let presence = sections.next().unwrap_or_default().trim();

    let password_auth = classify("PasswordAuthentication", sshd_value(config, "PasswordAuthentication"));
    let root_login = classify("PermitRootLogin", sshd_value(config, "PermitRootLogin"));
    let pubkey_auth = classify("PubkeyAuthentication", sshd_value(config, "PubkeyAuthentication"));
    let max_auth_tries = classify("MaxAuthTries", sshd_value(config, "MaxAuthTries"));
    let ssh_port = parse_ssh_port(config);

    let active = service_state.lines().next().map(str::trim) == Some("active");
    let fail2ban = Fail2banState {
        installed: active || presence.lines().next().map(str::trim) == Some("installed"),
        active,
    };

    let score = calculate_security_score(&SecurityChecks {
        password_auth_disabled: password_auth.status == SettingStatus::Secure,
        root_login_key_only: root_login.status == SettingStatus::Secure,
        fail2ban_active: fail2ban.active,
        ssh_port_changed: ssh_port != SSH_PORT,
    });

    SecureAuditResult {
        password_auth,
        root_login,
        pubkey_auth,
        max_auth_tries,
        fail2ban,
        ssh_port,
        score,
    }
}

/// `grep -c` style output; anything unreadable counts as zero.
pub fn parse_count(stdout: &str) -> u32 {
    stdout
        .lines()
        .find_map(|l| l.trim().parse::<u32>().ok())
        .unwrap_or(0)
}

// ==============================================================================
// 4. DNS, FQDN & Health
// ==============================================================================

/// IPv4 addresses in lookup output, in order, without duplicates.
/// CNAME targets and other non-address lines are skipped.
pub fn parse_dns_addresses(stdout: &str) -> Vec<Ipv4Addr> {
    let mut out: Vec<Ipv4Addr> = Vec::new();
    for addr in stdout.lines().filter_map(|l| l.trim().parse::<Ipv4Addr>().ok()) {
        if !out.contains(&addr) {
            out.push(addr);
        }
    }
    out
}

/// Stored FQDN from `psql -t -A`; empty output means unset.
pub fn parse_fqdn(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .filter(|l| !l.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

pub fn parse_http_status(stdout: &str) -> Option<u16> {
    stdout.trim().parse::<u16>().ok().filter(|c| *c != 0)
}
