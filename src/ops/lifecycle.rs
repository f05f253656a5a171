// src/ops/lifecycle.rs

use chrono::Utc;
use tracing::{info, warn};

use super::results::{AddServerResult, DestroyResult, Issue, RemoveServerResult};
use super::{settle, FleetService};
use crate::error::{FleetError, Result};
use crate::models::{ProviderKind, ServerMode, ServerRecord, DEFAULT_SSH_PORT};
use crate::sys::validate::{validate_ipv4, validate_port, validate_server_name};

#[derive(Debug, Clone, Default)]
pub struct AddServerRequest {
    pub provider: String,
    pub ip: String,
    pub name: String,
    pub region: Option<String>,
    pub size: Option<String>,
    pub mode: ServerMode,
    /// Provider-side id; without one the record is a manual server.
    pub server_id: Option<String>,
    /// Port sshd already listens on, when it is not 22.
    pub ssh_port: Option<u32>,
    pub skip_verify: bool,
}

impl FleetService {
    // ==============================================================================
    // 1. Add
    // ==============================================================================

    /// Registers an existing machine. Every validation runs before the record
    /// is written; the Coolify probe afterwards is advisory only.
    pub async fn add_server(&self, request: AddServerRequest) -> Result<AddServerResult> {
        settle(self.try_add_server(request).await)
    }

    async fn try_add_server(&self, request: AddServerRequest) -> Result<AddServerResult> {
        let kind: ProviderKind = request.provider.parse()?;
        let provider = self.provider_for(kind)?;

        let ip = validate_ipv4(&request.ip)?.to_string();
        let existing = self.inventory.list().await?;
        if let Some(other) = existing.iter().find(|r| r.ip == ip) {
            return Err(FleetError::Conflict(format!(
                "Server with IP {} already exists as '{}'",
                ip, other.name
            )));
        }

        let name = request.name.trim().to_string();
        validate_server_name(&name)?;
        if existing.iter().any(|r| r.name == name) {
            return Err(FleetError::Conflict(format!("Server named '{}' already exists", name)));
        }
        if let Some(id) = request.server_id.as_deref() {
            if existing.iter().any(|r| r.id == id) {
                return Err(FleetError::Conflict(format!("Server id '{}' is already registered", id)));
            }
        }
        let ssh_port = request.ssh_port.map(validate_port).transpose()?.unwrap_or(DEFAULT_SSH_PORT);

        match provider.validate_token().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(FleetError::Auth(format!("The {} API token was rejected", kind)));
            }
            Err(e) => {
                return Err(FleetError::Auth(format!("Could not validate the {} API token: {}", kind, e)));
            }
        }

        let now = Utc::now();
        let record = ServerRecord {
            id: request
                .server_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| ServerRecord::manual_id(now)),
            name,
            provider: kind,
            ip,
            region: request.region.unwrap_or_else(|| "unknown".to_string()),
            size: request.size.unwrap_or_else(|| "unknown".to_string()),
            created_at: now,
            mode: request.mode,
            ssh_port,
        };

        let verification = if request.skip_verify {
            None
        } else {
            Some(self.probe_server(&record).await)
        };

        self.inventory.save(record.clone()).await?;
        info!("✅ Added server '{}' ({}) via {}", record.name, record.ip, kind);

        Ok(AddServerResult {
            success: true,
            server: Some(record),
            verification,
            issue: Issue::default(),
        })
    }

    // ==============================================================================
    // 2. Remove (local only)
    // ==============================================================================

    /// Drops the inventory record. The machine itself is never touched.
    pub async fn remove_server(&self, selector: &str) -> Result<RemoveServerResult> {
        settle(self.try_remove_server(selector).await)
    }

    async fn try_remove_server(&self, selector: &str) -> Result<RemoveServerResult> {
        let record = self.resolve_server(selector).await?;
        self.inventory.remove(&record.id).await?;
        info!("Removed '{}' from the inventory", record.name);

        Ok(RemoveServerResult {
            success: true,
            server: Some(record),
            issue: Issue::default(),
        })
    }

    // ==============================================================================
    // 3. Destroy (cloud + local)
    // ==============================================================================

    pub async fn destroy_server(&self, selector: &str) -> Result<DestroyResult> {
        settle(self.try_destroy_server(selector).await)
    }

    async fn try_destroy_server(&self, selector: &str) -> Result<DestroyResult> {
        self.safe_mode().check("destroy")?;

        let record = self.resolve_server(selector).await?;
        if record.is_manual() {
            return Err(FleetError::Validation(format!(
                "Server '{}' was manually added and has no provider-side counterpart. Use `remove` to drop it from the inventory.",
                record.name
            )));
        }

        let provider = self.provider_for(record.provider)?;
        match provider.destroy_server(&record.id).await {
            Ok(()) => {
                let local_removed = self.inventory.remove(&record.id).await?;
                info!("💥 Destroyed '{}' on {}", record.name, record.provider);
                Ok(DestroyResult {
                    success: true,
                    server: Some(record.name),
                    cloud_deleted: true,
                    local_removed,
                    issue: Issue::default(),
                })
            }
            Err(e) if e.is_not_found() => {
                warn!("'{}' was already gone on {}; removing local record", record.name, record.provider);
                let local_removed = self.inventory.remove(&record.id).await?;
                Ok(DestroyResult {
                    success: true,
                    server: Some(record.name),
                    cloud_deleted: false,
                    local_removed,
                    issue: Issue::hint(format!(
                        "The server no longer exists on {}. It was probably deleted from the provider console; the local record was removed.",
                        record.provider
                    )),
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ops::results::CoolifyStatus;
    use crate::ops::testing::{server, CloudReply, FakeCloud, FakeExecutor, Harness, MemoryInventory, Reply};

    fn request(name: &str, ip: &str) -> AddServerRequest {
        AddServerRequest {
            provider: "hetzner".into(),
            ip: ip.into(),
            name: name.into(),
            server_id: Some("4711".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn add_persists_record_with_verification() {
        let h = Harness {
            exec: FakeExecutor::default().on("api/health", Reply::ok("200")),
            ..Default::default()
        };
        let outcome = h.service().add_server(request("web-1", "10.0.0.5")).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.verification, Some(CoolifyStatus::Running));
        let stored = h.inventory.snapshot();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "4711");
        assert_eq!(stored[0].mode, ServerMode::Coolify);
    }

    #[tokio::test]
    async fn add_without_server_id_is_manual() {
        let h = Harness::default();
        let mut req = request("web-1", "10.0.0.5");
        req.server_id = None;
        req.skip_verify = true;
        let outcome = h.service().add_server(req).await.unwrap();

        assert!(outcome.server.unwrap().is_manual());
        assert_eq!(outcome.verification, None);
        assert!(h.exec.calls().is_empty());
    }

    #[tokio::test]
    async fn add_duplicate_ip_conflicts_without_mutation() {
        let h = Harness {
            inventory: MemoryInventory::default().with(server("web-1", "10.0.0.5", "1")),
            ..Default::default()
        };
        let outcome = h.service().add_server(request("web-2", "10.0.0.5")).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.issue.kind, Some(ErrorKind::Conflict));
        assert!(outcome.issue.error.unwrap().contains("already exists"));
        assert_eq!(h.inventory.snapshot().len(), 1);
        assert!(h.cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn add_validation_order() {
        let h = Harness::default();

        let mut bad_provider = request("web-1", "10.0.0.5");
        bad_provider.provider = "aws".into();
        let outcome = h.service().add_server(bad_provider).await.unwrap();
        assert_eq!(outcome.issue.kind, Some(ErrorKind::Validation));

        let mut no_token = request("web-1", "10.0.0.5");
        no_token.provider = "vultr".into();
        let outcome = h.service().add_server(no_token).await.unwrap();
        assert_eq!(outcome.issue.kind, Some(ErrorKind::Auth));
        assert!(outcome.issue.error.unwrap().contains("VULTR_TOKEN"));

        let outcome = h.service().add_server(request("web-1", "127.0.0.1")).await.unwrap();
        assert_eq!(outcome.issue.kind, Some(ErrorKind::Validation));

        let outcome = h.service().add_server(request("Web_1", "10.0.0.5")).await.unwrap();
        assert_eq!(outcome.issue.kind, Some(ErrorKind::Validation));

        assert!(h.cloud.calls().is_empty());
        assert!(h.inventory.snapshot().is_empty());
    }

    #[tokio::test]
    async fn add_with_rejected_token_is_auth_error() {
        let h = Harness {
            cloud: FakeCloud::default().invalid_token(),
            ..Default::default()
        };
        let outcome = h.service().add_server(request("web-1", "10.0.0.5")).await.unwrap();

        assert_eq!(outcome.issue.kind, Some(ErrorKind::Auth));
        assert!(h.inventory.snapshot().is_empty());
    }

    #[tokio::test]
    async fn add_with_failing_token_check_is_auth_error() {
        let h = Harness {
            cloud: FakeCloud::default().token_check_reply(CloudReply::ServerError),
            ..Default::default()
        };
        let outcome = h.service().add_server(request("web-1", "10.0.0.5")).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.issue.kind, Some(ErrorKind::Auth));
        assert!(outcome.issue.error.unwrap().contains("Could not validate"));
        assert_eq!(h.cloud.calls(), vec!["validate_token".to_string()]);
        assert!(h.exec.calls().is_empty());
        assert!(h.inventory.snapshot().is_empty());
    }

    #[tokio::test]
    async fn add_with_moved_ssh_port_probes_and_stores_it() {
        let h = Harness::default();
        let mut req = request("web-1", "10.0.0.5");
        req.ssh_port = Some(2222);
        let outcome = h.service().add_server(req).await.unwrap();

        assert!(outcome.success);
        assert_eq!(h.inventory.snapshot()[0].ssh_port, 2222);
        assert!(h.exec.calls().iter().all(|c| c.starts_with("10.0.0.5:2222: ")));

        let mut req = request("web-2", "10.0.0.6");
        req.ssh_port = Some(0);
        let outcome = h.service().add_server(req).await.unwrap();
        assert_eq!(outcome.issue.kind, Some(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn add_verification_failures_are_advisory() {
        let h = Harness {
            exec: FakeExecutor::default().on("", Reply::Transport("ECONNREFUSED")),
            ..Default::default()
        };
        let outcome = h.service().add_server(request("web-1", "10.0.0.5")).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.verification, Some(CoolifyStatus::SshUnavailable));
    }

    #[tokio::test]
    async fn remove_never_calls_remote_or_provider() {
        let h = Harness {
            inventory: MemoryInventory::default().with(server("web-1", "10.0.0.5", "1")),
            ..Default::default()
        };
        let outcome = h.service().remove_server("10.0.0.5").await.unwrap();

        assert!(outcome.success);
        assert!(h.inventory.snapshot().is_empty());
        assert!(h.exec.calls().is_empty());
        assert!(h.cloud.calls().is_empty());

        let missing = h.service().remove_server("web-1").await.unwrap();
        assert_eq!(missing.issue.kind, Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn destroy_manual_server_is_refused_before_provider() {
        let h = Harness {
            inventory: MemoryInventory::default().with(server("web-1", "10.0.0.5", "manual-1700000000000")),
            ..Default::default()
        };
        let outcome = h.service().destroy_server("web-1").await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.issue.error.unwrap().contains("manually added"));
        assert!(h.cloud.calls().is_empty());
        assert_eq!(h.inventory.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn destroy_success_removes_both() {
        let h = Harness {
            inventory: MemoryInventory::default().with(server("web-1", "10.0.0.5", "4711")),
            ..Default::default()
        };
        let outcome = h.service().destroy_server("web-1").await.unwrap();

        assert!(outcome.success && outcome.cloud_deleted && outcome.local_removed);
        assert_eq!(h.cloud.calls(), vec!["destroy_server 4711".to_string()]);
        assert!(h.inventory.snapshot().is_empty());
    }

    #[tokio::test]
    async fn destroy_not_found_on_provider_converges() {
        let h = Harness {
            inventory: MemoryInventory::default().with(server("web-1", "10.0.0.5", "4711")),
            cloud: FakeCloud::default().destroy_reply(CloudReply::NotFound),
            ..Default::default()
        };
        let outcome = h.service().destroy_server("web-1").await.unwrap();

        assert!(outcome.success);
        assert!(!outcome.cloud_deleted);
        assert!(outcome.local_removed);
        assert!(outcome.issue.hint.is_some());
        assert!(h.inventory.snapshot().is_empty());
    }

    #[tokio::test]
    async fn destroy_provider_failure_keeps_record() {
        let h = Harness {
            inventory: MemoryInventory::default().with(server("web-1", "10.0.0.5", "4711")),
            cloud: FakeCloud::default().destroy_reply(CloudReply::ServerError),
            ..Default::default()
        };
        let outcome = h.service().destroy_server("web-1").await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.issue.kind, Some(ErrorKind::ProviderServer));
        assert!(outcome.issue.hint.is_some());
        assert_eq!(h.inventory.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn destroy_blocked_by_safe_mode() {
        let h = Harness {
            inventory: MemoryInventory::default().with(server("web-1", "10.0.0.5", "4711")),
            ..Default::default()
        };
        let outcome = h.safe_service().destroy_server("web-1").await.unwrap();

        assert_eq!(outcome.issue.kind, Some(ErrorKind::SafetyAbort));
        assert!(h.cloud.calls().is_empty());
        assert!(h.exec.calls().is_empty());
        assert_eq!(h.inventory.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn destroy_without_token_is_auth_error() {
        let h = Harness {
            inventory: MemoryInventory::default().with(server("web-1", "10.0.0.5", "4711")),
            ..Default::default()
        };
        let outcome = h.tokenless_service().destroy_server("web-1").await.unwrap();

        assert_eq!(outcome.issue.kind, Some(ErrorKind::Auth));
        assert!(h.cloud.calls().is_empty());
    }
}
