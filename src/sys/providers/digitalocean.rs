// src/sys/providers/digitalocean.rs

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{id_string, path_segment, ApiClient};
use crate::error::Result;
use crate::models::{ProviderKind, Snapshot, SnapshotCost};
use crate::sys::secrets::ProviderCredential;
use crate::sys::traits::CloudProvider;

const BASE_URL: &str = "https://api.digitalocean.com/v2";
const SNAPSHOT_RATE_USD: f64 = 0.06;

pub struct DigitalOceanProvider {
    api: ApiClient,
}

impl DigitalOceanProvider {
    pub fn new(credential: ProviderCredential) -> Self {
        Self {
            api: ApiClient::new(BASE_URL, credential),
        }
    }
}

#[derive(Deserialize)]
struct DropletSnapshot {
    id: Value,
    name: String,
    created_at: String,
    size_gigabytes: Option<f64>,
}

#[derive(Deserialize)]
struct SnapshotsResponse {
    snapshots: Vec<DropletSnapshot>,
}

#[derive(Deserialize)]
struct Action {
    id: Value,
    started_at: Option<String>,
}

#[derive(Deserialize)]
struct ActionResponse {
    action: Action,
}

#[async_trait]
impl CloudProvider for DigitalOceanProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DigitalOcean
    }

    async fn validate_token(&self) -> Result<bool> {
        self.api.probe("/account", &[]).await
    }

    async fn destroy_server(&self, server_id: &str) -> Result<()> {
        let id = path_segment(server_id)?;
        self.api.delete(&format!("/droplets/{}", id)).await
    }

    /// Snapshots are asynchronous actions; the returned id is the action id
    /// until the snapshot shows up in `list_snapshots`.
    async fn create_snapshot(&self, server_id: &str, name: &str) -> Result<Snapshot> {
        let id = path_segment(server_id)?;
        let body = json!({ "type": "snapshot", "name": name });
        let response: ActionResponse = self
            .api
            .post_json(&format!("/droplets/{}/actions", id), &body)
            .await?;
        Ok(Snapshot {
            id: format!("action-{}", id_string(&response.action.id)),
            name: name.to_string(),
            created_at: response.action.started_at.unwrap_or_default(),
            size_gb: None,
        })
    }

    async fn list_snapshots(&self, server_id: &str) -> Result<Vec<Snapshot>> {
        let id = path_segment(server_id)?;
        let response: SnapshotsResponse = self
            .api
            .get_json(&format!("/droplets/{}/snapshots", id), &[("per_page", "100")])
            .await?;
        Ok(response
            .snapshots
            .into_iter()
            .map(|s| Snapshot {
                id: id_string(&s.id),
                name: s.name,
                created_at: s.created_at,
                size_gb: s.size_gigabytes,
            })
            .collect())
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
