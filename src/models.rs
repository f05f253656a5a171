// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FleetError;

/// Prefix of locally generated ids for machines registered without a provider counterpart.
pub const MANUAL_ID_PREFIX: &str = "manual-";

/// Port sshd listens on until secure setup moves it.
pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

// ==============================================================================
// 1. Providers & Modes
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Hetzner,
    DigitalOcean,
    Vultr,
    Linode,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Hetzner,
        ProviderKind::DigitalOcean,
        ProviderKind::Vultr,
        ProviderKind::Linode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Hetzner => "hetzner",
            ProviderKind::DigitalOcean => "digitalocean",
            ProviderKind::Vultr => "vultr",
            ProviderKind::Linode => "linode",
        }
    }

    /// Environment variable the operator's token for this backend is read from.
    pub fn token_env(&self) -> &'static str {
        match self {
            ProviderKind::Hetzner => "HETZNER_TOKEN",
            ProviderKind::DigitalOcean => "DIGITALOCEAN_TOKEN",
            ProviderKind::Vultr => "VULTR_TOKEN",
            ProviderKind::Linode => "LINODE_TOKEN",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| {
                FleetError::Validation(format!(
                    "Invalid provider '{}'. Supported providers: hetzner, digitalocean, vultr, linode",
                    s
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Coolify,
    Bare,
}

impl ServerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMode::Coolify => "coolify",
            ServerMode::Bare => "bare",
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerMode {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coolify" => Ok(ServerMode::Coolify),
            "bare" => Ok(ServerMode::Bare),
            other => Err(FleetError::Validation(format!(
                "Invalid mode '{}'. Expected 'coolify' or 'bare'",
                other
            ))),
        }
    }
}

// ==============================================================================
// 2. Inventory Record
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    pub provider: ProviderKind,
    pub ip: String,
    pub region: String,
    pub size: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub mode: ServerMode,
    /// Where the executor dials sshd. Updated when secure setup moves the port.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
}

impl ServerRecord {
    pub fn manual_id(now: DateTime<Utc>) -> String {
        format!("{}{}", MANUAL_ID_PREFIX, now.timestamp_millis())
    }

    /// Registered by hand against an existing machine; the provider knows nothing about it.
    pub fn is_manual(&self) -> bool {
        self.id.starts_with(MANUAL_ID_PREFIX)
    }
}

// ==============================================================================
// 3. Remote Execution
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// ==============================================================================
// 4. Firewall
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl FromStr for Protocol {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(FleetError::Validation(format!(
                "Invalid protocol '{}'. Expected 'tcp' or 'udp'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FirewallAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    pub port: u16,
    /// Last port of a range rule such as `6001:6002/tcp`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_end: Option<u16>,
    pub protocol: Protocol,
    pub action: FirewallAction,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FirewallStatus {
    pub active: bool,
    pub rules: Vec<FirewallRule>,
}

// ==============================================================================
// 5. SSH Hardening Audit
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingStatus {
    Secure,
    Insecure,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshdSetting {
    pub key: String,
    pub value: Option<String>,
    pub status: SettingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Fail2banState {
    pub installed: bool,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureAuditResult {
    pub password_auth: SshdSetting,
    pub root_login: SshdSetting,
    pub pubkey_auth: SshdSetting,
    pub max_auth_tries: SshdSetting,
    pub fail2ban: Fail2banState,
    pub ssh_port: u16,
    pub score: u8,
}

// ==============================================================================
// 6. Snapshots
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub size_gb: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCost {
    pub monthly: f64,
    pub currency: String,
}
