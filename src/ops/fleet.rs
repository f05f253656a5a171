// src/ops/fleet.rs
//
// Health probes and snapshot management. Fleet-wide variants walk the
// inventory sequentially and collect every server's outcome on its own.

use chrono::Utc;
use tracing::{info, warn};

use super::results::{
    CoolifyStatus, FleetSnapshotsResult, HealthResult, Issue, ServerHealth, ServerSnapshots, SnapshotCostResult,
    SnapshotResult,
};
use super::{settle, FleetService};
use crate::error::{ErrorKind, FleetError, Result};
use crate::models::{ServerMode, ServerRecord};
use crate::sys::commands::{coolify_containers, coolify_health};
use crate::sys::parsers::{parse_count, parse_http_status};
use crate::sys::traits::CloudProvider;
use crate::sys::validate::assert_shell_safe;

const REACHABILITY_PROBE: &str = "true";

fn probe_error_status(err: &FleetError) -> CoolifyStatus {
    match err.kind() {
        ErrorKind::Transport => CoolifyStatus::SshUnavailable,
        _ => CoolifyStatus::VerificationFailed,
    }
}

impl FleetService {
    // ==============================================================================
    // 1. Probes
    // ==============================================================================

    /// HTTP health endpoint first, container names as fallback. Never fails.
    pub(super) async fn probe_server(&self, record: &ServerRecord) -> CoolifyStatus {
        if record.mode == ServerMode::Bare {
            return match self.run(record, REACHABILITY_PROBE).await {
                Ok(r) if r.success() => CoolifyStatus::Reachable,
                Ok(_) => CoolifyStatus::VerificationFailed,
                Err(e) => probe_error_status(&e),
            };
        }

        match self.run(record, &coolify_health(self.config.coolify_port)).await {
            Ok(r) if parse_http_status(&r.stdout) == Some(200) => return CoolifyStatus::Running,
            Ok(_) => {}
            Err(e) => return probe_error_status(&e),
        }

        match self.run(record, &coolify_containers()).await {
            Ok(r) if parse_count(&r.stdout) > 0 => CoolifyStatus::ContainersDetected,
            Ok(_) => CoolifyStatus::NotDetected,
            Err(e) => probe_error_status(&e),
        }
    }

    pub async fn health(&self, selector: Option<&str>) -> Result<HealthResult> {
        settle(self.try_health(selector).await)
    }

    async fn try_health(&self, selector: Option<&str>) -> Result<HealthResult> {
        let targets = match selector {
            Some(s) => vec![self.resolve_server(s).await?],
            None => self.inventory.list().await?,
        };

        let mut servers = Vec::with_capacity(targets.len());
        for record in targets {
            let status = self.probe_server(&record).await;
            info!("Health of '{}' ({}): {:?}", record.name, record.ip, status);
            servers.push(ServerHealth {
                server: record.name,
                ip: record.ip,
                mode: record.mode,
                status,
            });
        }

        Ok(HealthResult {
            success: true,
            servers,
            issue: Issue::default(),
        })
    }

    // ==============================================================================
    // 2. Snapshots
    // ==============================================================================

    /// Provider backend for a cloud-backed record; manual servers have none.
    fn snapshot_provider(&self, record: &ServerRecord) -> Result<Box<dyn CloudProvider>> {
        if record.is_manual() {
            return Err(FleetError::Validation(format!(
                "Server '{}' was manually added; snapshots need a provider-side server id",
                record.name
            )));
        }
        self.provider_for(record.provider)
    }

    pub async fn create_snapshot(&self, selector: &str, name: Option<&str>) -> Result<SnapshotResult> {
        settle(self.try_create_snapshot(selector, name).await)
    }

    async fn try_create_snapshot(&self, selector: &str, name: Option<&str>) -> Result<SnapshotResult> {
        let record = self.resolve_server(selector).await?;
        let provider = self.snapshot_provider(&record)?;

        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => {
                assert_shell_safe(n)?;
                n.to_string()
            }
            None => format!("{}-{}", record.name, Utc::now().format("%Y%m%d%H%M%S")),
        };

        let snapshot = provider.create_snapshot(&record.id, &name).await?;
        info!("📸 Snapshot '{}' requested for '{}'", snapshot.name, record.name);

        Ok(SnapshotResult {
            success: true,
            server: Some(record.name),
            snapshot: Some(snapshot),
            ..Default::default()
        })
    }

    pub async fn list_snapshots(&self, selector: &str) -> Result<SnapshotResult> {
        settle(self.try_list_snapshots(selector).await)
    }

    async fn try_list_snapshots(&self, selector: &str) -> Result<SnapshotResult> {
        let record = self.resolve_server(selector).await?;
        let snapshots = self.snapshot_provider(&record)?.list_snapshots(&record.id).await?;

        Ok(SnapshotResult {
            success: true,
            server: Some(record.name),
            snapshots,
            ..Default::default()
        })
    }

    /// Lists snapshots for every cloud-backed server. A failing server is
    /// reported in its own entry and never aborts the batch.
    pub async fn list_all_snapshots(&self) -> Result<FleetSnapshotsResult> {
        settle(self.try_list_all_snapshots().await)
    }

    async fn try_list_all_snapshots(&self) -> Result<FleetSnapshotsResult> {
        let mut servers = Vec::new();
        for record in self.inventory.list().await? {
            if record.is_manual() {
                continue;
            }

            let listed = match self.snapshot_provider(&record) {
                Ok(provider) => provider.list_snapshots(&record.id).await,
                Err(e) => Err(e),
            };
            let entry = match listed {
                Ok(snapshots) => ServerSnapshots {
                    server: record.name,
                    snapshots,
                    issue: Issue::default(),
                },
                Err(e) => {
                    warn!("Listing snapshots for '{}' failed: {}", record.name, e);
                    ServerSnapshots {
                        server: record.name,
                        snapshots: Vec::new(),
                        issue: Issue::from_error(&e),
                    }
                }
            };
            servers.push(entry);
        }

        Ok(FleetSnapshotsResult {
            success: true,
            servers,
            issue: Issue::default(),
        })
    }

    pub async fn delete_snapshot(&self, selector: &str, snapshot_id: &str) -> Result<SnapshotResult> {
        settle(self.try_delete_snapshot(selector, snapshot_id).await)
    }

    async fn try_delete_snapshot(&self, selector: &str, snapshot_id: &str) -> Result<SnapshotResult> {
        self.safe_mode().check("snapshot delete")?;

        let record = self.resolve_server(selector).await?;
        let provider = self.snapshot_provider(&record)?;
        provider.delete_snapshot(snapshot_id).await?;
        info!("🗑️ Deleted snapshot {} of '{}'", snapshot_id, record.name);

        Ok(SnapshotResult {
            success: true,
            server: Some(record.name),
            ..Default::default()
        })
    }

    /// Monthly storage estimate over the server's current snapshots.
    pub async fn snapshot_cost(&self, selector: &str) -> Result<SnapshotCostResult> {
        settle(self.try_snapshot_cost(selector).await)
    }

    async fn try_snapshot_cost(&self, selector: &str) -> Result<SnapshotCostResult> {
        let record = self.resolve_server(selector).await?;
        let provider = self.snapshot_provider(&record)?;
        let snapshots = provider.list_snapshots(&record.id).await?;

        let total_size_gb: f64 = snapshots.iter().filter_map(|s| s.size_gb).sum();
        let unsized_count = snapshots.iter().filter(|s| s.size_gb.is_none()).count();
        let issue = if unsized_count > 0 {
            Issue::warning(format!("{} snapshot(s) report no size and are not included", unsized_count))
        } else {
            Issue::default()
        };

        Ok(SnapshotCostResult {
            success: true,
            server: Some(record.name),
            snapshot_count: snapshots.len(),
            total_size_gb,
            cost: Some(provider.snapshot_cost_estimate(total_size_gb)),
            issue,
        })
    }
}
