// src/sys/providers/vultr.rs

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{path_segment, ApiClient};
use crate::error::Result;
use crate::models::{ProviderKind, Snapshot, SnapshotCost};
use crate::sys::secrets::ProviderCredential;
use crate::sys::traits::CloudProvider;

const BASE_URL: &str = "https://api.vultr.com/v2";
const SNAPSHOT_RATE_USD: f64 = 0.05;
const BYTES_PER_GB: f64 = 1_000_000_000.0;

pub struct VultrProvider {
    api: ApiClient,
}

impl VultrProvider {
    pub fn new(credential: ProviderCredential) -> Self {
        Self {
            api: ApiClient::new(BASE_URL, credential),
        }
    }
}

#[derive(Deserialize)]
struct VultrSnapshot {
    id: String,
    #[serde(default)]
    description: String,
    date_created: String,
    /// Bytes.
    size: Option<u64>,
}

impl From<VultrSnapshot> for Snapshot {
    fn from(s: VultrSnapshot) -> Self {
        Snapshot {
            id: s.id,
            name: s.description,
            created_at: s.date_created,
            size_gb: s.size.map(|b| b as f64 / BYTES_PER_GB),
        }
    }
}

#[derive(Deserialize)]
struct SnapshotResponse {
    snapshot: VultrSnapshot,
}

#[derive(Deserialize)]
struct SnapshotsResponse {
    snapshots: Vec<VultrSnapshot>,
}

#[async_trait]
impl CloudProvider for VultrProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Vultr
    }

    async fn validate_token(&self) -> Result<bool> {
        self.api.probe("/account", &[]).await
    }

    async fn destroy_server(&self, server_id: &str) -> Result<()> {
        let id = path_segment(server_id)?;
        self.api.delete(&format!("/instances/{}", id)).await
    }

    async fn create_snapshot(&self, server_id: &str, name: &str) -> Result<Snapshot> {
        let id = path_segment(server_id)?;
        let body = json!({ "instance_id": id, "description": name });
        let response: SnapshotResponse = self.api.post_json("/snapshots", &body).await?;
        Ok(response.snapshot.into())
    }

    /// Vultr snapshots are account-wide and carry no instance reference,
    /// so every snapshot on the account is returned.
    async fn list_snapshots(&self, server_id: &str) -> Result<Vec<Snapshot>> {
        path_segment(server_id)?;
        let response: SnapshotsResponse = self.api.get_json("/snapshots", &[("per_page", "100")]).await?;
        Ok(response.snapshots.into_iter().map(Snapshot::from).collect())
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let id = path_segment(snapshot_id)?;
        self.api.delete(&format!("/snapshots/{}", id)).await
    }

    fn snapshot_cost_estimate(&self, size_gb: f64) -> SnapshotCost {
        SnapshotCost {
            monthly: size_gb.max(0.0) * SNAPSHOT_RATE_USD,
            currency: "USD".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_converted_from_bytes() {
        let raw = r#"{"id":"cb676a46-66fd-4dfb-b839-443f2e6c0b60","date_created":"2026-04-08T19:56:23+00:00",
            "description":"nightly","size":42949672960,"status":"complete"}"#;
        let snap: Snapshot = serde_json::from_str::<VultrSnapshot>(raw).unwrap().into();
        assert_eq!(snap.name, "nightly");
        assert!((snap.size_gb.unwrap() - 42.94967296).abs() < 1e-6);
    }
}
