// src/sys/inventory.rs

use async_trait::async_trait;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{FleetError, Result};
use crate::models::ServerRecord;
use crate::sys::traits::InventoryStore;

/// Inventory persisted as a JSON array of records.
///
/// The in-process mutex serializes read-modify-write cycles. Two separate
/// processes writing the same file can still race; there is no file lock.
pub struct JsonInventory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonInventory {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<ServerRecord>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            FleetError::Inventory(format!("{} is corrupted: {}", self.path.display(), e))
        })
    }

    /// 🛡️ Write-then-rename: a crash mid-write never leaves a truncated inventory.
    fn store(&self, records: &[ServerRecord]) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let body = serde_json::to_string_pretty(records)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(body.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.as_file().set_permissions(std::fs::Permissions::from_mode(0o600))?;
        tmp.persist(&self.path).map_err(|e| FleetError::Io(e.error))?;

        debug!(path = %self.path.display(), count = records.len(), "inventory written");
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for JsonInventory {
    async fn list(&self) -> Result<Vec<ServerRecord>> {
        self.load().await
    }

    async fn find(&self, name_or_ip: &str) -> Result<Option<ServerRecord>> {
        let records = self.load().await?;
        let query = name_or_ip.trim();
        Ok(records
            .iter()
            .find(|r| r.name == query)
            .or_else(|| records.iter().find(|r| r.ip == query))
            .cloned())
    }

    async fn save(&self, record: ServerRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        if records.iter().any(|r| r.ip == record.ip && r.id != record.id) {
            return Err(FleetError::Conflict(format!(
                "A server with IP {} already exists in the inventory",
                record.ip
            )));
        }
        records.retain(|r| r.id != record.id);
        records.push(record);
        self.store(&records)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.store(&records)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProviderKind, ServerMode};
    use chrono::Utc;

    fn record(id: &str, name: &str, ip: &str) -> ServerRecord {
        ServerRecord {
            id: id.into(),
            name: name.into(),
            provider: ProviderKind::Hetzner,
            ip: ip.into(),
            region: "nbg1".into(),
            size: "cx22".into(),
            created_at: Utc::now(),
            mode: ServerMode::Coolify,
            ssh_port: 22,
        }
    }

    #[tokio::test]
    async fn missing_file_is_empty_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let inv = JsonInventory::new(dir.path().join("servers.json"));
        assert!(inv.list().await.unwrap().is_empty());
        assert!(!inv.remove("nope").await.unwrap());
    }

    #[tokio::test]
    async fn save_find_remove_round() {
        let dir = tempfile::tempdir().unwrap();
        let inv = JsonInventory::new(dir.path().join("nested").join("servers.json"));

        inv.save(record("1", "web-1", "1.2.3.4")).await.unwrap();
        inv.save(record("2", "web-2", "5.6.7.8")).await.unwrap();

        assert_eq!(inv.find("web-2").await.unwrap().unwrap().id, "2");
        assert_eq!(inv.find("1.2.3.4").await.unwrap().unwrap().name, "web-1");
        assert!(inv.find("web-3").await.unwrap().is_none());

        assert!(inv.remove("1").await.unwrap());
        assert_eq!(inv.list().await.unwrap().len(), 1);

        let mode = std::fs::metadata(inv.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn duplicate_ip_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let inv = JsonInventory::new(dir.path().join("servers.json"));
        inv.save(record("1", "web-1", "1.2.3.4")).await.unwrap();

        let err = inv.save(record("2", "web-2", "1.2.3.4")).await.unwrap_err();
        assert!(matches!(err, FleetError::Conflict(_)));
        assert_eq!(inv.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupted_file_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(&path, "{not json").unwrap();
        let inv = JsonInventory::new(path);
        assert!(matches!(inv.list().await.unwrap_err(), FleetError::Inventory(_)));
    }
}
