// src/sys/providers/hetzner.rs

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{id_string, path_segment, ApiClient};
use crate::error::Result;
use crate::models::{ProviderKind, Snapshot, SnapshotCost};
use crate::sys::secrets::ProviderCredential;
use crate::sys::traits::CloudProvider;

const BASE_URL: &str = "https://api.hetzner.cloud/v1";
/// EUR per GB per month for snapshot storage.
const SNAPSHOT_RATE_EUR: f64 = 0.0119;
/// Hetzner's page size ceiling.
const PER_PAGE: &str = "50";
/// Upper bound on followed pages, in case `next_page` never runs out.
const MAX_PAGES: u32 = 100;

pub struct HetznerProvider {
    api: ApiClient,
}

impl HetznerProvider {
    pub fn new(credential: ProviderCredential) -> Self {
        Self {
            api: ApiClient::new(BASE_URL, credential),
        }
    }
}

#[derive(Deserialize)]
struct Image {
    id: Value,
    description: Option<String>,
    created: String,
    image_size: Option<f64>,
    created_from: Option<CreatedFrom>,
}

#[derive(Deserialize)]
struct CreatedFrom {
    id: Value,
}

#[derive(Deserialize)]
struct CreateImageResponse {
    image: Image,
}

#[derive(Deserialize)]
struct ImagesResponse {
    images: Vec<Image>,
    meta: Option<Meta>,
}

#[derive(Deserialize)]
struct Meta {
    pagination: Pagination,
}

#[derive(Deserialize)]
struct Pagination {
    next_page: Option<u32>,
}

impl ImagesResponse {
    fn next_page(&self) -> Option<u32> {
        self.meta.as_ref().and_then(|m| m.pagination.next_page)
    }
}

impl From<Image> for Snapshot {
    fn from(image: Image) -> Self {
        Snapshot {
            id: id_string(&image.id),
            name: image.description.unwrap_or_default(),
            created_at: image.created,
            size_gb: image.image_size,
        }
    }
}

#[async_trait]
impl CloudProvider for HetznerProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Hetzner
    }

    async fn validate_token(&self) -> Result<bool> {
        self.api.probe("/servers", &[("per_page", "1")]).await
    }

    async fn destroy_server(&self, server_id: &str) -> Result<()> {
        let id = path_segment(server_id)?;
        self.api.delete(&format!("/servers/{}", id)).await
    }

    async fn create_snapshot(&self, server_id: &str, name: &str) -> Result<Snapshot> {
        let id = path_segment(server_id)?;
        let body = json!({ "type": "snapshot", "description": name });
        let response: CreateImageResponse = self
            .api
            .post_json(&format!("/servers/{}/actions/create_image", id), &body)
            .await?;
        Ok(response.image.into())
    }

    /// The images endpoint cannot filter by source server, so every page is
    /// read and filtered locally.
    async fn list_snapshots(&self, server_id: &str) -> Result<Vec<Snapshot>> {
        let id = path_segment(server_id)?;
        let mut snapshots = Vec::new();
        let mut page = 1;

        loop {
            let page_param = page.to_string();
            let response: ImagesResponse = self
                .api
                .get_json(
                    "/images",
                    &[("type", "snapshot"), ("per_page", PER_PAGE), ("page", page_param.as_str())],
                )
                .await?;
            let next = response.next_page();
            snapshots.extend(
                response
                    .images
                    .into_iter()
                    .filter(|img| img.created_from.as_ref().is_some_and(|c| id_string(&c.id) == id))
                    .map(Snapshot::from),
            );

            match next {
                Some(n) if n > page && page < MAX_PAGES => page = n,
                _ => break,
            }
        }
        Ok(snapshots)
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let id = path_segment(snapshot_id)?;
        self.api.delete(&format!("/images/{}", id)).await
    }

    fn snapshot_cost_estimate(&self, size_gb: f64) -> SnapshotCost {
        SnapshotCost {
            monthly: size_gb.max(0.0) * SNAPSHOT_RATE_EUR,
            currency: "EUR".to_string(),
        }
    }
}
