// src/sys/providers/linode.rs

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{id_string, path_segment, ApiClient};
use crate::error::{FleetError, Result};
use crate::models::{ProviderKind, Snapshot, SnapshotCost};
use crate::sys::secrets::ProviderCredential;
use crate::sys::traits::CloudProvider;

const BASE_URL: &str = "https://api.linode.com/v4";

pub struct LinodeProvider {
    api: ApiClient,
}

impl LinodeProvider {
    pub fn new(credential: ProviderCredential) -> Self {
        Self {
            api: ApiClient::new(BASE_URL, credential),
        }
    }
}

#[derive(Deserialize)]
struct Backup {
    id: Value,
    label: Option<String>,
    created: String,
    #[serde(default)]
    disks: Vec<BackupDisk>,
}

#[derive(Deserialize)]
struct BackupDisk {
    /// MB.
    size: f64,
}

impl From<Backup> for Snapshot {
    fn from(b: Backup) -> Self {
        let mb: f64 = b.disks.iter().map(|d| d.size).sum();
        Snapshot {
            id: id_string(&b.id),
            name: b.label.unwrap_or_default(),
            created_at: b.created,
            size_gb: (mb > 0.0).then_some(mb / 1024.0),
        }
    }
}

#[derive(Deserialize)]
struct SnapshotSlots {
    current: Option<Backup>,
    in_progress: Option<Backup>,
}

#[derive(Deserialize)]
struct BackupsResponse {
    #[serde(default)]
    automatic: Vec<Backup>,
    snapshot: Option<SnapshotSlots>,
}

#[async_trait]
impl CloudProvider for LinodeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Linode
    }

    async fn validate_token(&self) -> Result<bool> {
        self.api.probe("/profile", &[]).await
    }

    async fn destroy_server(&self, server_id: &str) -> Result<()> {
        let id = path_segment(server_id)?;
        self.api.delete(&format!("/linode/instances/{}", id)).await
    }

    async fn create_snapshot(&self, server_id: &str, name: &str) -> Result<Snapshot> {
        let id = path_segment(server_id)?;
        let body = json!({ "label": name });
        let backup: Backup = self
            .api
            .post_json(&format!("/linode/instances/{}/backups", id), &body)
            .await?;
        Ok(backup.into())
    }

    async fn list_snapshots(&self, server_id: &str) -> Result<Vec<Snapshot>> {
        let id = path_segment(server_id)?;
        let response: BackupsResponse = self
            .api
            .get_json(&format!("/linode/instances/{}/backups", id), &[])
            .await?;

        let mut backups = response.automatic;
        if let Some(slots) = response.snapshot {
            backups.extend(slots.current);
            backups.extend(slots.in_progress);
        }
        Ok(backups.into_iter().map(Snapshot::from).collect())
    }

    async fn delete_snapshot(&self, _snapshot_id: &str) -> Result<()> {
        Err(FleetError::Validation(
            "Linode does not support deleting backup snapshots; a new manual snapshot replaces the previous one".into(),
        ))
    }

    /// Manual snapshots are included in the Linode Backup plan.
    fn snapshot_cost_estimate(&self, _size_gb: f64) -> SnapshotCost {
        SnapshotCost {
            monthly: 0.0,
            currency: "USD".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backups_and_snapshot_slots_are_flattened() {
        let raw = r#"{"automatic":[{"id":1,"label":null,"created":"2026-01-01T00:00:00","disks":[{"size":2048,"label":"root"}]}],
            "snapshot":{"current":{"id":2,"label":"manual","created":"2026-01-02T00:00:00","disks":[]},"in_progress":null}}"#;
        let parsed: BackupsResponse = serde_json::from_str(raw).unwrap();
        let mut all = parsed.automatic;
        if let Some(slots) = parsed.snapshot {
            all.extend(slots.current);
            all.extend(slots.in_progress);
        }
        let snaps: Vec<Snapshot> = all.into_iter().map(Snapshot::from).collect();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].size_gb, Some(2.0));
        assert_eq!(snaps[1].name, "manual");
        assert_eq!(snaps[1].size_gb, None);
    }

    #[tokio::test]
    async fn delete_is_unsupported() {
        let provider = LinodeProvider::new(ProviderCredential::new(b"t".to_vec()));
        let err = provider.delete_snapshot("2").await.unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
    }
}
