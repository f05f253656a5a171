// src/sys/commands.rs
//
// 🛡️ SOLID: Pure builders. No I/O, no clocks, no randomness: identical inputs
// always render identical command strings, so a dry run shows exactly what runs.
// 🛡️ Zero-Trust: every interpolated value is re-checked against an allow-list.
// Builders fail closed; nothing is ever escaped.

use crate::error::{FleetError, Result};
use crate::models::{Protocol, ServerMode, DEFAULT_SSH_PORT};
use crate::sys::validate::{assert_shell_safe, validate_ipv4};

/// Echoed after each completed step so a failure can be pinned to one step.
pub const STEP_MARKER: &str = "__FK_STEP_DONE__:";

/// Separates independent sections of a multi-probe command.
pub const SECTION_SEPARATOR: &str = "__FK_SECTION__";

pub const SSH_PORT: u16 = DEFAULT_SSH_PORT;
pub const COOLIFY_PORTS: [u16; 5] = [80, 443, 8000, 6001, 6002];
pub const BARE_PORTS: [u16; 2] = [80, 443];
pub const PROTECTED_PORTS: [u16; 1] = [SSH_PORT];

const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";
const APT: &str = "DEBIAN_FRONTEND=noninteractive apt-get";
const COOLIFY_PSQL: &str = "docker exec coolify-db psql -U coolify -d coolify";

pub fn ports_for_mode(mode: ServerMode) -> &'static [u16] {
    match mode {
        ServerMode::Coolify => &COOLIFY_PORTS,
        ServerMode::Bare => &BARE_PORTS,
    }
}

// ==============================================================================
// 1. Step-Aware Scripts
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStep {
    pub label: String,
    pub command: String,
}

/// An ordered list of labelled steps sent in a single round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteScript {
    steps: Vec<RemoteStep>,
}

impl RemoteScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.steps.push(RemoteStep {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    pub fn steps(&self) -> &[RemoteStep] {
        &self.steps
    }

    pub fn label_at(&self, index: usize) -> Option<&str> {
        self.steps.get(index).map(|s| s.label.as_str())
    }

    /// Every step runs inside `{ ...; }` so `||` inside a step cannot leak
    /// into the `&&` chain, and a failing step short-circuits the rest.
    pub fn render(&self) -> String {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{{ {}; }} && echo '{}{}'", step.command, STEP_MARKER, i + 1))
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

// ==============================================================================
// 2. SSH Hardening & Intrusion Prevention
// ==============================================================================

/// Prints the number of public keys in root's authorized_keys (0 when absent).
pub fn authorized_keys_count() -> String {
    "grep -cE '^(ssh-(rsa|ed25519|dss)|ecdsa-sha2-|sk-)' ~/.ssh/authorized_keys 2>/dev/null || true".to_string()
}

fn sshd_directive(key: &str, value: &str) -> Result<String> {
    assert_shell_safe(key)?;
    assert_shell_safe(value)?;
    Ok(format!(
        "sed -i -E 's/^#?[[:space:]]*{key}[[:space:]].*/{key} {value}/' {cfg} && (grep -qE '^{key}[[:space:]]' {cfg} || echo '{key} {value}' >> {cfg})",
        key = key,
        value = value,
        cfg = SSHD_CONFIG
    ))
}

/// Disables password logins, limits root to keys, caps retries and moves
/// sshd from `current_port` to `port` when they differ. Validates the config
/// before restarting.
pub fn ssh_hardening(current_port: u16, port: Option<u16>) -> Result<RemoteScript> {
    let new_port = match port {
        Some(0) => return Err(FleetError::Validation("SSH port must be between 1 and 65535".into())),
        Some(p) if p != current_port => Some(p),
        _ => None,
    };

    let mut script = RemoteScript::new()
        .step("backup sshd_config", format!("cp -p {cfg} {cfg}.fleetkeeper.bak", cfg = SSHD_CONFIG))
        .step("disable password authentication", sshd_directive("PasswordAuthentication", "no")?)
        .step("restrict root login to keys", sshd_directive("PermitRootLogin", "prohibit-password")?)
        .step("require public key authentication", sshd_directive("PubkeyAuthentication", "yes")?)
        .step("cap authentication retries", sshd_directive("MaxAuthTries", "3")?)
        .step(
            "override drop-in password settings",
            "for f in /etc/ssh/sshd_config.d/*.conf; do [ -f \"$f\" ] && sed -i -E 's/^[[:space:]]*PasswordAuthentication[[:space:]]+yes/PasswordAuthentication no/I' \"$f\"; done; true",
        );

    if let Some(p) = new_port {
        script = script
            .step("change ssh port", sshd_directive("Port", &p.to_string())?)
            .step(
                "allow new ssh port in firewall",
                format!("if command -v ufw >/dev/null 2>&1; then ufw allow {}/tcp; fi", p),
            );
    }

    Ok(script
        .step("validate sshd configuration", "sshd -t")
        .step("restart ssh service", "systemctl restart ssh 2>/dev/null || systemctl restart sshd"))
}

pub fn fail2ban_install(ssh_port: u16) -> Result<RemoteScript> {
    if ssh_port == 0 {
        return Err(FleetError::Validation("SSH port must be between 1 and 65535".into()));
    }
    Ok(RemoteScript::new()
        .step(
            "install fail2ban",
            format!("{apt} update -qq && {apt} install -y -qq fail2ban", apt = APT),
        )
        .step(
            "write sshd jail",
            format!(
                r"printf '[sshd]\nenabled = true\nport = {}\nmaxretry = 5\nfindtime = 600\nbantime = 3600\n' > /etc/fail2ban/jail.local",
                ssh_port
            ),
        )
        .step("enable fail2ban", "systemctl enable fail2ban && systemctl restart fail2ban"))
}

/// One round trip: effective sshd config, fail2ban activity, fail2ban presence.
pub fn secure_audit() -> String {
    format!(
        "(sshd -T 2>/dev/null || cat {cfg} 2>/dev/null); echo '{sep}'; systemctl is-active fail2ban 2>/dev/null; echo '{sep}'; if command -v fail2ban-client >/dev/null 2>&1; then echo installed; else echo missing; fi",
        cfg = SSHD_CONFIG,
        sep = SECTION_SEPARATOR
    )
}

// ==============================================================================
// 3. Host Firewall (UFW)
// ==============================================================================

pub fn firewall_setup(mode: ServerMode, ssh_port: u16) -> Result<RemoteScript> {
    if ssh_port == 0 {
        return Err(FleetError::Validation("SSH port must be between 1 and 65535".into()));
    }

    let mut script = RemoteScript::new()
        .step(
            "install ufw",
            format!(
                "command -v ufw >/dev/null 2>&1 || ({apt} update -qq && {apt} install -y -qq ufw)",
                apt = APT
            ),
        )
        .step("default deny incoming", "ufw default deny incoming")
        .step("default allow outgoing", "ufw default allow outgoing")
        .step("allow ssh", format!("ufw allow {}/tcp", SSH_PORT));

    if ssh_port != SSH_PORT {
        script = script.step("allow custom ssh port", format!("ufw allow {}/tcp", ssh_port));
    }
    for port in ports_for_mode(mode) {
        script = script.step(format!("allow port {}", port), format!("ufw allow {}/tcp", port));
    }

    Ok(script.step("enable firewall", "ufw --force enable"))
}

pub fn firewall_allow(port: u16, protocol: Protocol) -> Result<String> {
    if port == 0 {
        return Err(FleetError::Validation("Port must be between 1 and 65535".into()));
    }
    Ok(format!("ufw allow {}/{}", port, protocol.as_str()))
}

pub fn firewall_delete(port: u16, protocol: Protocol) -> Result<String> {
    if port == 0 {
        return Err(FleetError::Validation("Port must be between 1 and 65535".into()));
    }
    Ok(format!("ufw delete allow {}/{}", port, protocol.as_str()))
}

/// Exits 0 even when ufw is missing; an empty listing parses as inactive.
pub fn firewall_status() -> String {
    "ufw status numbered 2>/dev/null || true".to_string()
}

// ==============================================================================
// 4. Coolify Domain (FQDN)
// ==============================================================================

pub fn coolify_db_ready() -> String {
    "docker exec coolify-db pg_isready -U coolify -d coolify".to_string()
}

/// `https://<domain>` or `http://<domain>` for a validated domain.
pub fn domain_url(domain: &str, ssl: bool) -> Result<String> {
    assert_shell_safe(domain)?;
    let scheme = if ssl { "https" } else { "http" };
    Ok(format!("{}://{}", scheme, domain))
}

/// `http://<ip>:<port>`: back to IP-addressed access.
pub fn ip_url(ip: &str, port: u16) -> Result<String> {
    validate_ipv4(ip)?;
    if port == 0 {
        return Err(FleetError::Validation("Port must be between 1 and 65535".into()));
    }
    Ok(format!("http://{}:{}", ip, port))
}

/// Stores `fqdn` (already built by [`domain_url`] or [`ip_url`]) and restarts Coolify.
pub fn fqdn_update(fqdn: &str) -> Result<RemoteScript> {
    let host = fqdn
        .strip_prefix("https://")
        .or_else(|| fqdn.strip_prefix("http://"))
        .ok_or_else(|| FleetError::Validation(format!("FQDN must start with http:// or https://: '{}'", fqdn)))?;
    assert_shell_safe(host)?;

    Ok(RemoteScript::new()
        .step(
            "update instance fqdn",
            format!(
                "{} -c \"UPDATE instance_settings SET fqdn = '{}' WHERE id = 0;\"",
                COOLIFY_PSQL, fqdn
            ),
        )
        .step("restart coolify", "docker restart coolify"))
}

pub fn fqdn_read() -> String {
    format!(
        "{} -t -A -c \"SELECT fqdn FROM instance_settings WHERE id = 0;\"",
        COOLIFY_PSQL
    )
}

/// Forward lookup via `dig`, with `getent` as fallback; one address per line.
pub fn dns_lookup(domain: &str) -> Result<String> {
    assert_shell_safe(domain)?;
    Ok(format!(
        "{{ dig +short A {d} 2>/dev/null; getent ahostsv4 {d} 2>/dev/null | awk '{{print $1}}'; }} | head -n 10",
        d = domain
    ))
}

// ==============================================================================
// 5. Health Probes
// ==============================================================================

pub fn coolify_health(port: u16) -> String {
    format!(
        "curl -s -o /dev/null -w '%{{http_code}}' --max-time 5 http://localhost:{}/api/health",
        port
    )
}

pub fn coolify_containers() -> String {
    "docker ps --format '{{.Names}}' 2>/dev/null | grep -c coolify || true".to_string()
}
