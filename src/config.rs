// src/config.rs

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

const DEFAULT_SSH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
const DEFAULT_COOLIFY_PORT: u16 = 8000;

#[derive(Clone, Debug)]
pub struct FleetConfig {
    // 📂 Local State
    pub home: PathBuf,

    // 🛡️ Destructive-action switch, threaded into every operation call
    pub safe_mode: bool,

    // 🔑 Remote Channel
    pub ssh_user: String,
    pub ssh_identity: Option<PathBuf>,
    pub ssh_connect_timeout: Duration,
    pub ssh_command_timeout: Duration,

    pub coolify_port: u16,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from(".fleetkeeper"),
            safe_mode: false,
            ssh_user: "root".to_string(),
            ssh_identity: None,
            ssh_connect_timeout: Duration::from_secs(DEFAULT_SSH_TIMEOUT_SECS),
            ssh_command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            coolify_port: DEFAULT_COOLIFY_PORT,
        }
    }
}

impl FleetConfig {
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `load` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let home = lookup("FLEETKEEPER_HOME")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".fleetkeeper")))
            .unwrap_or(defaults.home);

        Self {
            home,
            safe_mode: lookup("FLEETKEEPER_SAFE_MODE").is_some_and(|v| parse_flag(&v)),
            ssh_user: lookup("FLEETKEEPER_SSH_USER")
                .filter(|u| !u.trim().is_empty())
                .unwrap_or(defaults.ssh_user),
            ssh_identity: lookup("FLEETKEEPER_SSH_KEY").map(PathBuf::from),
            ssh_connect_timeout: parse_or_warn(
                &lookup,
                "FLEETKEEPER_SSH_TIMEOUT_SECS",
                DEFAULT_SSH_TIMEOUT_SECS,
            )
            .map(Duration::from_secs)
            .unwrap_or(defaults.ssh_connect_timeout),
            ssh_command_timeout: parse_or_warn(
                &lookup,
                "FLEETKEEPER_COMMAND_TIMEOUT_SECS",
                DEFAULT_COMMAND_TIMEOUT_SECS,
            )
            .map(Duration::from_secs)
            .unwrap_or(defaults.ssh_command_timeout),
            coolify_port: parse_or_warn(&lookup, "FLEETKEEPER_COOLIFY_PORT", DEFAULT_COOLIFY_PORT)
                .filter(|p| *p != 0)
                .unwrap_or(defaults.coolify_port),
        }
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.home.join("servers.json")
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Unset means default; an unparsable value is logged and replaced by the default.
fn parse_or_warn<F, T>(lookup: &F, key: &str, default: T) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("{} has invalid value '{}', using {}", key, raw, default);
            None
        }
    }
}
