// src/ops/hardening.rs
//
// 🛡️ SSH hardening and fail2ban. The authorized-key check runs before any
// configuration change: disabling password logins without a key on the
// host would lock the operator out. A port move is written to the inventory
// as soon as sshd restarts on it; every later round trip dials the new port.

use tracing::{info, warn};

use super::results::{Issue, Outcome, SecureAuditOutcome, SecureSetupResult};
use super::{settle, FleetService};
use crate::error::{FleetError, Result};
use crate::sys::commands::{
    authorized_keys_count, fail2ban_install, secure_audit, ssh_hardening, SECTION_SEPARATOR, SSH_PORT,
};
use crate::sys::parsers::{parse_count, parse_secure_audit};
use crate::sys::validate::validate_port;

fn failed_step_of(err: &FleetError) -> Option<String> {
    match err {
        FleetError::Command { failed_step, .. } => failed_step.clone(),
        _ => None,
    }
}

impl FleetService {
    // ==============================================================================
    // 1. Secure Setup
    // ==============================================================================

    pub async fn secure_setup(&self, selector: &str, ssh_port: Option<u32>) -> Result<SecureSetupResult> {
        settle(self.try_secure_setup(selector, ssh_port).await)
    }

    async fn try_secure_setup(&self, selector: &str, ssh_port: Option<u32>) -> Result<SecureSetupResult> {
        let mut record = self.resolve_server(selector).await?;
        let new_port = ssh_port.map(validate_port).transpose()?;
        let hardening = ssh_hardening(record.ssh_port, new_port)?;
        let effective_port = new_port.unwrap_or(record.ssh_port);
        let jail = fail2ban_install(effective_port)?;

        let keys = parse_count(&self.run_checked(&record, &authorized_keys_count()).await?);
        if keys == 0 {
            let err = FleetError::SafetyAbort(format!(
                "No authorized SSH keys found on '{}'; refusing to disable password authentication",
                record.name
            ));
            warn!("🛡️ {}", err);
            let port_flag = match record.ssh_port {
                SSH_PORT => String::new(),
                port => format!("-p {} ", port),
            };
            let mut issue = Issue::from_error(&err);
            issue.hint = Some(format!(
                "Install your public key first (for example `ssh-copy-id {}{}@{}`), then run secure setup again.",
                port_flag, self.config.ssh_user, record.ip
            ));
            return Ok(SecureSetupResult {
                server: Some(record.name),
                ..SecureSetupResult::failed(issue)
            });
        }
        info!("Found {} authorized key(s) on '{}'; hardening sshd", keys, record.name);

        if let Err(e) = self.run_script(&record, &hardening).await {
            return Ok(SecureSetupResult {
                server: Some(record.name),
                failed_step: failed_step_of(&e),
                ..SecureSetupResult::failed(Issue::from_error(&e))
            });
        }

        if effective_port != record.ssh_port {
            info!("sshd on '{}' moved from port {} to {}", record.name, record.ssh_port, effective_port);
            record.ssh_port = effective_port;
            self.inventory.save(record.clone()).await?;
        }

        let (fail2ban_installed, failed_step, issue) = match self.run_script(&record, &jail).await {
            Ok(_) => (true, None, Issue::default()),
            Err(e) => {
                warn!("fail2ban setup on '{}' failed: {}", record.name, e);
                let diagnosed = Issue::from_error(&e);
                let issue = Issue {
                    warning: diagnosed.error,
                    kind: diagnosed.kind,
                    hint: Some(
                        "SSH hardening was applied but fail2ban could not be installed. Re-run secure setup to retry."
                            .to_string(),
                    ),
                    error: None,
                };
                (false, failed_step_of(&e), issue)
            }
        };

        info!("✅ Secure setup finished on '{}' (fail2ban: {})", record.name, fail2ban_installed);
        Ok(SecureSetupResult {
            success: true,
            server: Some(record.name),
            ssh_hardened: true,
            fail2ban_installed,
            partial: !fail2ban_installed,
            ssh_port: Some(effective_port),
            failed_step,
            issue,
        })
    }

    // ==============================================================================
    // 2. Secure Audit
    // ==============================================================================

    /// One round trip; sshd config, fail2ban state and presence are separated
    /// by the section token.
    pub async fn secure_audit(&self, selector: &str) -> Result<SecureAuditOutcome> {
        settle(self.try_secure_audit(selector).await)
    }

    async fn try_secure_audit(&self, selector: &str) -> Result<SecureAuditOutcome> {
        let record = self.resolve_server(selector).await?;
        let output = self.run(&record, &secure_audit()).await?;

        // Both `sshd -T` and the config file fallback produced nothing.
        let config_section = output.stdout.split(SECTION_SEPARATOR).next().unwrap_or_default();
        if config_section.trim().is_empty() {
            return Err(FleetError::Command {
                exit_code: output.exit_code,
                failed_step: Some("read sshd configuration".to_string()),
                stderr: match output.stderr.trim() {
                    "" => "sshd configuration could not be read".to_string(),
                    stderr => stderr.to_string(),
                },
            });
        }
        let audit = parse_secure_audit(&output.stdout);
        info!("Security score for '{}': {}/100", record.name, audit.score);

        Ok(SecureAuditOutcome {
            success: true,
            server: Some(record.name),
            audit: Some(audit),
            issue: Issue::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::config::FleetConfig;
    use crate::ops::testing::{server, FakeExecutor, Harness, MemoryInventory, Reply};
    use crate::sys::commands::SECTION_SEPARATOR;

    fn harness(exec: FakeExecutor) -> Harness {
        Harness {
            exec,
            inventory: MemoryInventory::default().with(server("web-1", "10.0.0.5", "1")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn zero_keys_aborts_before_hardening() {
        let h = harness(FakeExecutor::default().on("authorized_keys", Reply::ok("0\n")));
        let outcome = h.service().secure_setup("web-1", None).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.issue.kind, Some(ErrorKind::SafetyAbort));
        assert!(outcome.issue.hint.unwrap().contains("ssh-copy-id root@10.0.0.5"));
        assert_eq!(h.exec.calls().len(), 1);
        assert!(!h.exec.ran("sshd_config"));
    }

    #[tokio::test]
    async fn full_setup_hardens_and_installs_fail2ban() {
        let h = harness(FakeExecutor::default().on("authorized_keys", Reply::ok("2\n")));
        let outcome = h.service().secure_setup("web-1", Some(2222)).await.unwrap();

        assert!(outcome.success);
        assert!(outcome.ssh_hardened && outcome.fail2ban_installed);
        assert!(!outcome.partial);
        assert_eq!(outcome.ssh_port, Some(2222));
        assert!(h.exec.ran("PasswordAuthentication no"));
        assert!(h.exec.ran("fail2ban"));
    }

    #[tokio::test]
    async fn key_hint_uses_configured_user_and_port() {
        let mut record = server("web-1", "10.0.0.5", "1");
        record.ssh_port = 2222;
        let h = Harness {
            exec: FakeExecutor::default().on("authorized_keys", Reply::ok("0\n")),
            inventory: MemoryInventory::default().with(record),
            ..Default::default()
        };
        let config = FleetConfig {
            ssh_user: "deploy".to_string(),
            ..FleetConfig::default()
        };
        let outcome = h.configured_service(config).secure_setup("web-1", None).await.unwrap();

        assert!(outcome.issue.hint.unwrap().contains("ssh-copy-id -p 2222 deploy@10.0.0.5"));
    }

    #[tokio::test]
    async fn port_move_is_recorded_before_fail2ban() {
        let h = harness(FakeExecutor::default().on("authorized_keys", Reply::ok("1\n")));
        let outcome = h.service().secure_setup("web-1", Some(2222)).await.unwrap();
        assert!(outcome.success && !outcome.partial);

        let calls = h.exec.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].starts_with("10.0.0.5:22: ") && calls[1].contains("Port 2222"));
        assert!(calls[2].starts_with("10.0.0.5:2222: ") && calls[2].contains("jail.local"));
        assert!(calls[2].contains("port = 2222"));
        assert_eq!(h.inventory.snapshot()[0].ssh_port, 2222);

        h.service().secure_audit("web-1").await.unwrap();
        assert!(h.exec.calls()[3].starts_with("10.0.0.5:2222: "));
    }

    #[tokio::test]
    async fn failed_hardening_keeps_the_old_port() {
        let h = harness(
            FakeExecutor::default()
                .on("authorized_keys", Reply::ok("1\n"))
                .on("sshd -t", Reply::failed_after(8, "sshd: bad configuration")),
        );
        let outcome = h.service().secure_setup("web-1", Some(2222)).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.failed_step.as_deref(), Some("validate sshd configuration"));
        assert_eq!(h.inventory.snapshot()[0].ssh_port, 22);
    }

    #[tokio::test]
    async fn hardening_failure_is_fatal_and_names_step() {
        let h = harness(
            FakeExecutor::default()
                .on("authorized_keys", Reply::ok("1\n"))
                .on("sshd -t", Reply::failed_after(6, "sshd: bad configuration")),
        );
        let outcome = h.service().secure_setup("web-1", None).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.failed_step.as_deref(), Some("validate sshd configuration"));
        assert_eq!(outcome.issue.kind, Some(ErrorKind::Command));
        assert!(!h.exec.ran("jail.local"));
    }

    #[tokio::test]
    async fn fail2ban_failure_is_partial_success() {
        let h = harness(
            FakeExecutor::default()
                .on("authorized_keys", Reply::ok("1\n"))
                .on("jail.local", Reply::failed_after(0, "E: Unable to locate package fail2ban")),
        );
        let outcome = h.service().secure_setup("web-1", None).await.unwrap();

        assert!(outcome.success);
        assert!(outcome.partial);
        assert!(outcome.ssh_hardened);
        assert!(!outcome.fail2ban_installed);
        assert!(outcome.issue.warning.is_some());
        assert!(outcome.issue.hint.unwrap().contains("Re-run"));
    }

    #[tokio::test]
    async fn invalid_port_never_reaches_remote() {
        let h = harness(FakeExecutor::default());
        let outcome = h.service().secure_setup("web-1", Some(70000)).await.unwrap();

        assert_eq!(outcome.issue.kind, Some(ErrorKind::Validation));
        assert!(h.exec.calls().is_empty());
    }

    #[tokio::test]
    async fn audit_parses_sections() {
        let output = format!(
            "PasswordAuthentication no\nPermitRootLogin prohibit-password\nPort 2222\n{sep}\nactive\n{sep}\ninstalled\n",
            sep = SECTION_SEPARATOR
        );
        let h = harness(FakeExecutor::default().on(SECTION_SEPARATOR, Reply::ok(&output)));
        let outcome = h.service().secure_audit("web-1").await.unwrap();

        let audit = outcome.audit.unwrap();
        assert_eq!(audit.score, 100);
        assert_eq!(audit.ssh_port, 2222);
        assert!(audit.fail2ban.active);
    }

    #[tokio::test]
    async fn audit_without_sshd_config_fails() {
        let output = format!("{sep}\ninactive\n{sep}\nmissing\n", sep = SECTION_SEPARATOR);
        let h = harness(FakeExecutor::default().on(SECTION_SEPARATOR, Reply::ok(&output)));
        let outcome = h.service().secure_audit("web-1").await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.audit.is_none());
        assert_eq!(outcome.issue.kind, Some(ErrorKind::Command));
        assert!(outcome.issue.error.unwrap().contains("sshd configuration could not be read"));
    }

    #[tokio::test]
    async fn audit_transport_failure_is_normalized() {
        let h = harness(FakeExecutor::default().on("", Reply::Transport("ECONNREFUSED")));
        let outcome = h.service().secure_audit("web-1").await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.issue.kind, Some(ErrorKind::Transport));
        assert!(outcome.issue.hint.unwrap().contains("refused"));
    }
}
