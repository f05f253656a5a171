// src/ops/firewall.rs
//
// 🛡️ Host firewall (UFW). Port 22 is never removable; closing a port Coolify
// depends on goes through but carries a warning.

use tracing::{info, warn};

use super::results::{FirewallResult, Issue, Outcome};
use super::{settle, FleetService};
use crate::error::{FleetError, Result};
use crate::models::{FirewallStatus, Protocol, ServerRecord};
use crate::sys::commands::{
    firewall_allow, firewall_delete, firewall_setup, firewall_status, COOLIFY_PORTS, PROTECTED_PORTS,
};
use crate::sys::parsers::parse_ufw_status;
use crate::sys::validate::validate_port;

impl FleetService {
    async fn read_firewall(&self, record: &ServerRecord) -> Result<FirewallStatus> {
        let output = self.run_checked(record, &firewall_status()).await?;
        Ok(parse_ufw_status(&output))
    }

    // ==============================================================================
    // 1. Setup
    // ==============================================================================

    /// Default-deny inbound, then SSH plus the port set for the server's mode.
    /// Without `ssh_port` the port sshd is known to listen on stays open.
    pub async fn firewall_setup(&self, selector: &str, ssh_port: Option<u32>) -> Result<FirewallResult> {
        settle(self.try_firewall_setup(selector, ssh_port).await)
    }

    async fn try_firewall_setup(&self, selector: &str, ssh_port: Option<u32>) -> Result<FirewallResult> {
        let record = self.resolve_server(selector).await?;
        let ssh_port = ssh_port.map(validate_port).transpose()?.unwrap_or(record.ssh_port);
        let script = firewall_setup(record.mode, ssh_port)?;

        if let Err(e) = self.run_script(&record, &script).await {
            let failed_step = match &e {
                FleetError::Command { failed_step, .. } => failed_step.clone(),
                _ => None,
            };
            return Ok(FirewallResult {
                server: Some(record.name),
                failed_step,
                ..FirewallResult::failed(Issue::from_error(&e))
            });
        }
        info!("🧱 Firewall enabled on '{}' ({} mode)", record.name, record.mode);

        // The rules are already in place; a failed read-back is only worth a warning.
        let (status, issue) = match self.read_firewall(&record).await {
            Ok(status) => (Some(status), Issue::default()),
            Err(e) => (None, Issue::warning(format!("Firewall enabled but status could not be read: {}", e))),
        };

        Ok(FirewallResult {
            success: true,
            server: Some(record.name),
            status,
            failed_step: None,
            issue,
        })
    }

    // ==============================================================================
    // 2. Rules
    // ==============================================================================

    pub async fn firewall_add(&self, selector: &str, port: u32, protocol: &str) -> Result<FirewallResult> {
        settle(self.try_firewall_add(selector, port, protocol).await)
    }

    async fn try_firewall_add(&self, selector: &str, port: u32, protocol: &str) -> Result<FirewallResult> {
        let port = validate_port(port)?;
        let protocol: Protocol = protocol.parse()?;
        let command = firewall_allow(port, protocol)?;

        let record = self.resolve_server(selector).await?;
        self.run_checked(&record, &command).await?;
        info!("Allowed {}/{} on '{}'", port, protocol.as_str(), record.name);

        Ok(FirewallResult {
            success: true,
            server: Some(record.name),
            ..Default::default()
        })
    }

    pub async fn firewall_remove(&self, selector: &str, port: u32, protocol: &str) -> Result<FirewallResult> {
        settle(self.try_firewall_remove(selector, port, protocol).await)
    }

    async fn try_firewall_remove(&self, selector: &str, port: u32, protocol: &str) -> Result<FirewallResult> {
        let port = validate_port(port)?;
        if PROTECTED_PORTS.contains(&port) {
            return Err(FleetError::Validation(format!(
                "Port {} is the SSH port and cannot be removed from the firewall",
                port
            )));
        }
        let protocol: Protocol = protocol.parse()?;
        let command = firewall_delete(port, protocol)?;

        let record = self.resolve_server(selector).await?;
        if port == record.ssh_port {
            return Err(FleetError::Validation(format!(
                "Port {} is the SSH port of '{}' and cannot be removed from the firewall",
                port, record.name
            )));
        }
        self.run_checked(&record, &command).await?;
        info!("Removed {}/{} on '{}'", port, protocol.as_str(), record.name);

        let issue = if COOLIFY_PORTS.contains(&port) {
            warn!("Port {} closed on '{}' is used by Coolify", port, record.name);
            Issue::warning(format!(
                "Port {} is used by Coolify; the dashboard, proxy or realtime features may stop working",
                port
            ))
        } else {
            Issue::default()
        };

        Ok(FirewallResult {
            success: true,
            server: Some(record.name),
            issue,
            ..Default::default()
        })
    }

    // ==============================================================================
    // 3. Status
    // ==============================================================================

    pub async fn firewall_status(&self, selector: &str) -> Result<FirewallResult> {
        settle(self.try_firewall_status(selector).await)
    }

    async fn try_firewall_status(&self, selector: &str) -> Result<FirewallResult> {
        let record = self.resolve_server(selector).await?;
        let status = self.read_firewall(&record).await?;

        Ok(FirewallResult {
            success: true,
            server: Some(record.name),
            status: Some(status),
            ..Default::default()
        })
    }
}
